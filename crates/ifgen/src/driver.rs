use std::io;

/// Abstraction for a byte-oriented physical transport.
///
/// This trait is all a new link (serial port, IPC socket, simulated link)
/// has to provide to carry packets for the stack. Each frame handed to
/// [`write`](Driver::write) is one complete packet, header included, and each
/// successful [`read`](Driver::read) is expected to yield one complete frame.
///
/// Only the interface worker calls these methods, never concurrently.
pub trait Driver: Send + 'static {
    /// Write one frame. Returns the number of bytes written.
    fn write(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Read one frame into `buf`.
    ///
    /// `Ok(0)` (or an error of kind [`io::ErrorKind::WouldBlock`]) means
    /// nothing is available. Should return promptly: a read that blocks
    /// stalls transmit servicing for the interface.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release driver-owned resources. Called once at interface teardown.
    fn cleanup(&mut self) {}
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        (**self).write(frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn cleanup(&mut self) {
        (**self).cleanup()
    }
}

/// Whether a read error only means "nothing available right now".
pub(crate) fn is_idle_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}
