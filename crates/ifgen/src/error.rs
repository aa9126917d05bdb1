use crate::buffer::PacketBuf;
use std::io;

/// Errors surfaced by interface setup and the send entry point.
///
/// Worker loop failures never surface here; they are counted on the
/// interface and logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of resources: {0}")]
    OutOfResources(String),

    #[error("invalid frame: {len} bytes is shorter than the {header_size} byte header")]
    InvalidFrame { len: usize, header_size: usize },

    #[error("transport error: {0}")]
    Transport(io::Error),

    #[error("{0} is closed")]
    Closed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A packet the send entry point refused.
///
/// Ownership of the packet never transfers on failure: it is handed back
/// here and the caller decides whether to retry or release it.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue is full")]
    Full(PacketBuf),

    #[error("interface is closed")]
    Closed(PacketBuf),
}

impl SendError {
    /// Take back the rejected packet.
    pub fn into_packet(self) -> PacketBuf {
        match self {
            SendError::Full(packet) | SendError::Closed(packet) => packet,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, SendError::Full(_))
    }
}

impl From<SendError> for Error {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Full(_) => Error::OutOfResources("outbound queue is full".to_string()),
            SendError::Closed(_) => Error::Closed("outbound queue".to_string()),
        }
    }
}
