use crate::driver::Driver;
use std::io;
use tokio::sync::mpsc;

/// In-process driver: two connected ends exchanging whole frames over
/// bounded channels.
///
/// Useful for tests and for wiring two interfaces of the same process
/// together.
pub struct LoopbackDriver {
    tx: Option<mpsc::Sender<Vec<u8>>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl LoopbackDriver {
    /// Create two connected ends, each buffering up to `capacity` frames.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let capacity = capacity.max(1);
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Some(a_tx),
                rx: a_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }
}

impl Driver for LoopbackDriver {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        let Some(tx) = &self.tx else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "loopback closed"));
        };
        match tx.try_send(frame.to_vec()) {
            Ok(()) => Ok(frame.len()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "loopback peer is full",
            )),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "loopback peer closed",
            )),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.try_recv() {
            Ok(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(0),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "loopback peer closed",
            )),
        }
    }

    fn cleanup(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}
