//! Packet identifier and its on-wire header encoding.
//!
//! The header layout depends on the protocol version:
//!
//! | version | size | layout (MSB first)                                   |
//! |---------|------|------------------------------------------------------|
//! | 1       | 4    | prio:2 src:5 dst:5 dport:6 sport:6 flags:8           |
//! | 2       | 6    | prio:2 dst:14 src:14 dport:6 sport:6 flags:6         |
//!
//! Both are big-endian. Fields wider than their slot are masked on encode.

use serde::{Deserialize, Serialize};

/// Size of the largest header across all protocol versions.
pub const MAX_HEADER_SIZE: usize = 6;

/// Active protocol version, which fixes the header size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Number of header bytes prepended to every frame.
    pub const fn header_size(self) -> usize {
        match self {
            ProtocolVersion::V1 => 4,
            ProtocolVersion::V2 => 6,
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProtocolVersion::V1),
            2 => Ok(ProtocolVersion::V2),
            other => Err(format!("protocol version must be 1 or 2 (got {other})")),
        }
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", u8::from(*self))
    }
}

/// Addressing metadata carried in the packet header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketId {
    pub priority: u8,
    pub source: u16,
    pub destination: u16,
    pub destination_port: u8,
    pub source_port: u8,
    pub flags: u8,
}

impl PacketId {
    /// Encode into the first `version.header_size()` bytes of `out`.
    ///
    /// Returns `None` if `out` is too short.
    pub fn encode(&self, version: ProtocolVersion, out: &mut [u8]) -> Option<()> {
        let size = version.header_size();
        let out = out.get_mut(..size)?;
        match version {
            ProtocolVersion::V1 => {
                let raw = (u32::from(self.priority) & 0x3) << 30
                    | (u32::from(self.source) & 0x1f) << 25
                    | (u32::from(self.destination) & 0x1f) << 20
                    | (u32::from(self.destination_port) & 0x3f) << 14
                    | (u32::from(self.source_port) & 0x3f) << 8
                    | u32::from(self.flags);
                out.copy_from_slice(&raw.to_be_bytes());
            }
            ProtocolVersion::V2 => {
                let raw = (u64::from(self.priority) & 0x3) << 46
                    | (u64::from(self.destination) & 0x3fff) << 32
                    | (u64::from(self.source) & 0x3fff) << 18
                    | (u64::from(self.destination_port) & 0x3f) << 12
                    | (u64::from(self.source_port) & 0x3f) << 6
                    | u64::from(self.flags) & 0x3f;
                out.copy_from_slice(&raw.to_be_bytes()[2..]);
            }
        }
        Some(())
    }

    /// Decode from the first `version.header_size()` bytes of `bytes`.
    ///
    /// Returns `None` if `bytes` is shorter than the header.
    pub fn decode(version: ProtocolVersion, bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..version.header_size())?;
        let id = match version {
            ProtocolVersion::V1 => {
                let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                PacketId {
                    priority: (raw >> 30) as u8 & 0x3,
                    source: (raw >> 25) as u16 & 0x1f,
                    destination: (raw >> 20) as u16 & 0x1f,
                    destination_port: (raw >> 14) as u8 & 0x3f,
                    source_port: (raw >> 8) as u8 & 0x3f,
                    flags: raw as u8,
                }
            }
            ProtocolVersion::V2 => {
                let mut wide = [0u8; 8];
                wide[2..].copy_from_slice(bytes);
                let raw = u64::from_be_bytes(wide);
                PacketId {
                    priority: (raw >> 46) as u8 & 0x3,
                    destination: (raw >> 32) as u16 & 0x3fff,
                    source: (raw >> 18) as u16 & 0x3fff,
                    destination_port: (raw >> 12) as u8 & 0x3f,
                    source_port: (raw >> 6) as u8 & 0x3f,
                    flags: raw as u8 & 0x3f,
                }
            }
        };
        Some(id)
    }
}
