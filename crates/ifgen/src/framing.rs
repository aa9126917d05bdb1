//! Framing rules applied at the driver boundary.

use crate::buffer::{BufferPool, PacketBuf};
use crate::error::{Error, Result};
use crate::header::ProtocolVersion;

/// Header size for the given protocol version (4 or 6 bytes).
pub fn header_size(version: ProtocolVersion) -> usize {
    version.header_size()
}

/// Prepend the header in place and return the bytes to hand to the driver.
pub fn frame(packet: &mut PacketBuf, version: ProtocolVersion) -> &[u8] {
    packet.prepend_header(version)
}

/// Rebuild a packet from bytes read off the driver.
///
/// Frames shorter than the header are rejected before anything is taken
/// from the pool.
pub fn deframe(bytes: &[u8], version: ProtocolVersion, pool: &BufferPool) -> Result<PacketBuf> {
    let header_size = version.header_size();
    if bytes.len() < header_size {
        return Err(Error::InvalidFrame {
            len: bytes.len(),
            header_size,
        });
    }

    let mut packet = pool.acquire(bytes.len() - header_size).ok_or_else(|| {
        Error::OutOfResources(format!(
            "no buffer for {} byte payload",
            bytes.len() - header_size
        ))
    })?;

    packet.load_frame(version, bytes);
    if !packet.strip_header(version) {
        return Err(Error::InvalidFrame {
            len: bytes.len(),
            header_size,
        });
    }
    Ok(packet)
}
