//! Fixed-size byte buffers shared between connections.
//!
//! A [`BufferPool`] hands out exclusively owned buffers and takes them back. Connections
//! only see the trait, [`SimpleBufferPool`] is the default implementation: a bounded free
//! list behind a mutex. [`PooledBuffer`] ties a buffer to its pool so that dropping it is
//! the release.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use once_cell::sync::Lazy;
use tracing::trace;

use crate::options::DEFAULT_BUFFER_SIZE;

static SHARED_POOL: Lazy<Arc<dyn BufferPool>> = Lazy::new(|| Arc::new(SimpleBufferPool::default()));

/// The process-wide pool connections use unless they are given one.
pub fn shared_pool() -> Arc<dyn BufferPool> {
    Arc::clone(&SHARED_POOL)
}

/// Source of fixed-size write buffers.
///
/// `allocate` returns an empty buffer with at least `buffer_size` bytes of capacity that
/// the caller owns exclusively. `release` gives it back, releasing the same buffer twice
/// is impossible because the pool takes it by value.
pub trait BufferPool: Send + Sync + fmt::Debug {
    fn allocate(&self) -> BytesMut;

    fn release(&self, buffer: BytesMut);

    fn buffer_size(&self) -> usize;
}

#[derive(Debug)]
pub struct SimpleBufferPool {
    buffer_size: usize,
    max_pooled: usize,
    free: Mutex<Vec<BytesMut>>,
}

impl SimpleBufferPool {
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self { buffer_size, max_pooled, free: Mutex::new(Vec::with_capacity(max_pooled)) }
    }

    /// Number of buffers currently waiting in the free list.
    pub fn pooled(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or_default()
    }
}

impl Default for SimpleBufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, 256)
    }
}

impl BufferPool for SimpleBufferPool {
    fn allocate(&self) -> BytesMut {
        let reused = self.free.lock().ok().and_then(|mut free| free.pop());
        match reused {
            Some(buffer) => buffer,
            None => BytesMut::with_capacity(self.buffer_size),
        }
    }

    fn release(&self, mut buffer: BytesMut) {
        // buffers that were split or shrunk can't serve a full allocation again
        if buffer.capacity() < self.buffer_size {
            trace!(capacity = buffer.capacity(), "drop undersized buffer");
            return;
        }
        buffer.clear();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_pooled {
                free.push(buffer);
            }
        }
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

/// A buffer borrowed from a [`BufferPool`], returned to it on drop.
pub struct PooledBuffer {
    buffer: BytesMut,
    pool: Arc<dyn BufferPool>,
}

impl PooledBuffer {
    pub fn acquire(pool: &Arc<dyn BufferPool>) -> Self {
        let mut buffer = pool.allocate();
        buffer.clear();
        Self { buffer, pool: Arc::clone(pool) }
    }

    /// The number of bytes this buffer is meant to hold.
    pub fn limit(&self) -> usize {
        self.pool.buffer_size()
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.buffer.len()).field("limit", &self.limit()).finish()
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.pool.release(buffer);
    }
}
