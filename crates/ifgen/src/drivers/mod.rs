//! Drivers bundled with the crate.

mod loopback;
mod udp;

#[cfg(unix)]
mod socketpair;

pub use loopback::LoopbackDriver;
pub use udp::UdpDriver;

#[cfg(unix)]
pub use socketpair::SocketPairDriver;
