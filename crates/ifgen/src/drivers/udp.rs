use crate::driver::Driver;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use tracing::trace;

/// Frame I/O over UDP: one datagram per frame, exchanged with a single peer.
///
/// Datagrams from any other source are ignored.
pub struct UdpDriver {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
}

impl UdpDriver {
    /// Bind a non-blocking socket on `local` that exchanges frames with `peer`.
    pub fn bind(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&local.into())?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket: Some(socket.into()),
            peer,
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket()?.local_addr()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Change the peer frames are sent to and accepted from.
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = peer;
    }

    fn socket(&self) -> io::Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "udp socket closed"))
    }
}

impl Driver for UdpDriver {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.socket()?.send_to(frame, self.peer)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket()?.recv_from(buf) {
            Ok((len, from)) if from == self.peer => Ok(len),
            Ok((len, from)) => {
                trace!(%from, len, "ignoring datagram from unknown source");
                Ok(0)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn cleanup(&mut self) {
        self.socket = None;
    }
}
