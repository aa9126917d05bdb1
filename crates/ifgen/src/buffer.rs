//! Shared packet buffer pool.
//!
//! Storage is allocated once up front and recycled. Every buffer reserves
//! [`MAX_HEADER_SIZE`] bytes of headroom ahead of the payload so a header can
//! be prepended in place on transmit.

use crate::header::{MAX_HEADER_SIZE, PacketId, ProtocolVersion};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of buffers in a pool.
pub const DEFAULT_BUFFER_COUNT: usize = 32;

/// Default payload capacity of a single buffer.
pub const DEFAULT_BUFFER_DATA_SIZE: usize = 256;

/// A fixed-size pool of packet buffers shared by every interface.
///
/// Cloning the pool is cheap and yields a handle to the same storage.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    data_size: usize,
    capacity: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

impl PoolInner {
    fn release(&self, storage: Box<[u8]>) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        free.push(storage);
    }
}

impl BufferPool {
    /// Create a pool of `count` buffers able to hold `data_size` payload bytes each.
    pub fn new(count: usize, data_size: usize) -> Self {
        let free = (0..count)
            .map(|_| vec![0u8; MAX_HEADER_SIZE + data_size].into_boxed_slice())
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                data_size,
                capacity: count,
                free: Mutex::new(free),
            }),
        }
    }

    /// Take a buffer able to hold `size` payload bytes.
    ///
    /// Returns `None` when the pool is exhausted or `size` exceeds the
    /// buffer data size. Never blocks.
    pub fn acquire(&self, size: usize) -> Option<PacketBuf> {
        if size > self.inner.data_size {
            return None;
        }
        let storage = {
            let mut free = self.inner.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.pop()?
        };
        Some(PacketBuf {
            storage,
            len: 0,
            id: PacketId::default(),
            pool: self.inner.clone(),
        })
    }

    /// Payload capacity of every buffer in this pool.
    pub fn data_size(&self) -> usize {
        self.inner.data_size
    }

    /// Total number of buffers owned by the pool.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of buffers currently free.
    pub fn available(&self) -> usize {
        self.inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_DATA_SIZE)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("data_size", &self.inner.data_size)
            .field("capacity", &self.inner.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// A packet held in pool storage.
///
/// Dropping the handle returns the storage to its pool.
pub struct PacketBuf {
    storage: Box<[u8]>,
    len: usize,
    id: PacketId,
    pool: Arc<PoolInner>,
}

impl PacketBuf {
    /// Addressing metadata for this packet.
    pub fn id(&self) -> &PacketId {
        &self.id
    }

    pub fn set_id(&mut self, id: PacketId) {
        self.id = id;
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.storage[MAX_HEADER_SIZE..MAX_HEADER_SIZE + self.len]
    }

    /// Mutable payload bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[MAX_HEADER_SIZE..MAX_HEADER_SIZE + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum payload this buffer can hold.
    pub fn capacity(&self) -> usize {
        self.storage.len() - MAX_HEADER_SIZE
    }

    /// Replace the payload with `src`.
    ///
    /// Returns `false` and leaves the packet untouched if `src` does not fit.
    pub fn set_data(&mut self, src: &[u8]) -> bool {
        if src.len() > self.capacity() {
            return false;
        }
        self.storage[MAX_HEADER_SIZE..MAX_HEADER_SIZE + src.len()].copy_from_slice(src);
        self.len = src.len();
        true
    }

    /// Copy this packet into a fresh buffer from the same pool.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn try_clone(&self) -> Option<PacketBuf> {
        let pool = BufferPool {
            inner: self.pool.clone(),
        };
        let mut copy = pool.acquire(self.len)?;
        copy.set_data(self.data());
        copy.id = self.id;
        Some(copy)
    }

    /// Encode the header into the headroom and return the framed bytes.
    pub(crate) fn prepend_header(&mut self, version: ProtocolVersion) -> &[u8] {
        let start = MAX_HEADER_SIZE - version.header_size();
        // Headroom is always MAX_HEADER_SIZE bytes, so encoding cannot fail.
        let _ = self.id.encode(version, &mut self.storage[start..MAX_HEADER_SIZE]);
        &self.storage[start..MAX_HEADER_SIZE + self.len]
    }

    /// Load a received frame (header included) so that its header ends
    /// exactly where the payload begins.
    ///
    /// The caller guarantees `frame.len() >= header_size` and that the
    /// payload fits.
    pub(crate) fn load_frame(&mut self, version: ProtocolVersion, frame: &[u8]) {
        let start = MAX_HEADER_SIZE - version.header_size();
        self.storage[start..start + frame.len()].copy_from_slice(frame);
        self.len = frame.len() - version.header_size();
    }

    /// Decode the header sitting in the headroom into the packet id.
    pub(crate) fn strip_header(&mut self, version: ProtocolVersion) -> bool {
        let start = MAX_HEADER_SIZE - version.header_size();
        match PacketId::decode(version, &self.storage[start..MAX_HEADER_SIZE]) {
            Some(id) => {
                self.id = id;
                true
            }
            None => false,
        }
    }
}

impl Drop for PacketBuf {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        self.pool.release(storage);
    }
}

impl fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuf")
            .field("id", &self.id)
            .field("len", &self.len)
            .finish()
    }
}
