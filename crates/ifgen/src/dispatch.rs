//! Receive dispatch: hands reconstructed packets to the rest of the stack.

use crate::buffer::PacketBuf;
use crate::registry::InterfaceName;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default depth of the receive dispatch queue.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 32;

/// A packet received on an interface.
#[derive(Debug)]
pub struct RxMessage {
    pub iface: InterfaceName,
    pub packet: PacketBuf,
}

/// Fire-and-forget hand-off into the stack's receive path.
pub trait RxDispatch: Send + Sync + 'static {
    /// Deliver `packet` received on `source`.
    ///
    /// Must not block. When the packet cannot be accepted it is handed back
    /// so the caller can release it and account for the drop.
    fn deliver(&self, packet: PacketBuf, source: &InterfaceName) -> Result<(), PacketBuf>;
}

/// Creates a bounded dispatch channel.
pub fn rx_channel(capacity: usize) -> (RxSender, RxReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (RxSender { tx }, RxReceiver { rx })
}

/// Dispatch side given to interfaces.
#[derive(Clone, Debug)]
pub struct RxSender {
    tx: mpsc::Sender<RxMessage>,
}

impl RxDispatch for RxSender {
    fn deliver(&self, packet: PacketBuf, source: &InterfaceName) -> Result<(), PacketBuf> {
        self.tx
            .try_send(RxMessage {
                iface: source.clone(),
                packet,
            })
            .map_err(|e| e.into_inner().packet)
    }
}

/// Stack side of the dispatch channel.
#[derive(Debug)]
pub struct RxReceiver {
    rx: mpsc::Receiver<RxMessage>,
}

impl RxReceiver {
    /// Wait for the next received packet.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<RxMessage> {
        self.rx.recv().await
    }

    /// Wait up to `timeout` for the next received packet.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<RxMessage> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn try_recv(&mut self) -> Option<RxMessage> {
        self.rx.try_recv().ok()
    }

    /// Blocking receive for callers outside an async runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async execution context.
    pub fn blocking_recv(&mut self) -> Option<RxMessage> {
        self.rx.blocking_recv()
    }
}
