use crate::driver::Driver;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Frame I/O over one end of a Unix `SOCK_DGRAM` socketpair.
///
/// Each datagram is one frame. Both ends are non-blocking, so reads never
/// stall the worker.
pub struct SocketPairDriver {
    fd: Option<OwnedFd>,
}

impl SocketPairDriver {
    /// Create both ends of a new socketpair.
    pub fn pair() -> io::Result<(Self, Self)> {
        let mut fds: [RawFd; 2] = [-1, -1];

        let result =
            unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_DGRAM, 0, fds.as_mut_ptr()) };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        let a = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let b = unsafe { OwnedFd::from_raw_fd(fds[1]) };

        Ok((Self::from_fd(a)?, Self::from_fd(b)?))
    }

    /// Wrap an existing datagram socket, switching it to non-blocking mode.
    pub fn from_fd(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self { fd: Some(fd) })
    }

    /// Get the raw file descriptor (for debugging/logging).
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    fn raw(&self) -> io::Result<RawFd> {
        self.as_raw_fd()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socketpair closed"))
    }
}

impl Driver for SocketPairDriver {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        let fd = self.raw()?;
        let n = unsafe { libc::send(fd, frame.as_ptr() as *const _, frame.len(), 0) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.raw()?;
        let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut _, buf.len(), 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            Err(err)
        } else {
            Ok(n as usize)
        }
    }

    fn cleanup(&mut self) {
        self.fd = None;
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let result = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
