//! Bounded outbound FIFO between the send entry point and the worker.
//!
//! Producers may live on any thread; the single consumer is the worker.
//! A zero timeout means a non-blocking poll.

use crate::buffer::PacketBuf;
use crate::error::SendError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError, TrySendError};

/// Create a queue holding at most `capacity` packets.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn outbound_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer side of the outbound queue.
#[derive(Clone, Debug)]
pub struct QueueSender {
    tx: mpsc::Sender<PacketBuf>,
}

impl QueueSender {
    /// Non-blocking enqueue. On failure the packet is handed back.
    pub fn try_enqueue(&self, packet: PacketBuf) -> Result<(), SendError> {
        self.tx.try_send(packet).map_err(|e| match e {
            TrySendError::Full(packet) => SendError::Full(packet),
            TrySendError::Closed(packet) => SendError::Closed(packet),
        })
    }

    /// Enqueue, waiting up to `timeout` for space.
    pub async fn enqueue(&self, packet: PacketBuf, timeout: Duration) -> Result<(), SendError> {
        if timeout.is_zero() {
            return self.try_enqueue(packet);
        }
        self.tx
            .send_timeout(packet, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(packet) => SendError::Full(packet),
                SendTimeoutError::Closed(packet) => SendError::Closed(packet),
            })
    }

    /// Number of packets waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer side of the outbound queue, owned by the adapter state.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<PacketBuf>,
}

impl QueueReceiver {
    /// Non-blocking dequeue.
    pub fn try_dequeue(&mut self) -> Option<PacketBuf> {
        match self.rx.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Dequeue, waiting up to `timeout` for a packet.
    pub async fn dequeue(&mut self, timeout: Duration) -> Option<PacketBuf> {
        if timeout.is_zero() {
            return self.try_dequeue();
        }
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Refuse further packets and release everything still queued.
    ///
    /// Returns how many packets were discarded.
    pub fn close(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
