//! Generic interface adapter for a packet stack.
//!
//! Any byte-oriented transport that can write and read whole frames becomes
//! a stack interface by implementing [`Driver`]. The adapter owns an
//! outbound queue and a worker loop that, on each iteration, transmits at
//! most one queued packet and then polls the driver for one received frame.

mod buffer;
mod config;
mod dispatch;
mod driver;
mod drivers;
mod error;
pub mod framing;
mod header;
mod interface;
mod queue;
mod registry;
mod stack;
mod worker;

pub use buffer::{BufferPool, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_DATA_SIZE, PacketBuf};
pub use config::{
    DEFAULT_IDLE_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY, ExecutionMode, InterfaceConfig, StackConfig,
};
pub use dispatch::{
    DEFAULT_DISPATCH_CAPACITY, RxDispatch, RxMessage, RxReceiver, RxSender, rx_channel,
};
pub use driver::Driver;
pub use drivers::{LoopbackDriver, UdpDriver};
pub use error::{Error, Result, SendError};
pub use header::{MAX_HEADER_SIZE, PacketId, ProtocolVersion};
pub use interface::{Interface, InterfaceBuilder, InterfaceStats, Nexthop};
pub use queue::{QueueReceiver, QueueSender, outbound_queue};
pub use registry::{IFACE_NAME_MAX, InterfaceName, Registry, interface_name};
pub use stack::Stack;
pub use worker::{AdapterState, StepOutcome};

#[cfg(unix)]
pub use drivers::SocketPairDriver;
