//! Shared read-buffer pool.
//!
//! Each connection borrows one `BytesMut` for its whole lifetime. When the
//! connection ends the [`PooledBuffer`] guard clears the buffer and hands it
//! back, so steady-state connection churn does not allocate.

use bytes::BytesMut;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// A pool of reusable read buffers.
#[derive(Debug)]
pub struct BufferPool {
    /// Idle buffers (LIFO for cache locality)
    free: Mutex<Vec<BytesMut>>,
    /// Capacity each buffer is allocated with
    buffer_size: usize,
    /// Maximum number of idle buffers kept around
    max_idle: usize,
}

impl BufferPool {
    /// Creates an empty pool handing out buffers of `buffer_size` bytes.
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            buffer_size,
            max_idle,
        }
    }

    /// Takes a buffer from the pool, allocating one if none is idle.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size));

        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    /// Size of the buffers this pool hands out.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of idle buffers currently in the pool.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        // Buffers that grew past their original size are not worth keeping
        if buf.capacity() < self.buffer_size || buf.capacity() > self.buffer_size * 2 {
            return;
        }

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`].
///
/// Derefs to `BytesMut`; the buffer goes back to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<BytesMut>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        // Only `Drop` takes the buffer out
        self.buf.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.buf.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
