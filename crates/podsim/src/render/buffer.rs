use core::ops::{Deref, DerefMut};

use crate::lock::Mutex;

/// Buffers that grew past this capacity are dropped instead of retained.
pub const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// Default number of idle buffers a [`BufferPool`] keeps.
pub const DEFAULT_RETAINED_BUFFERS: usize = 32;

/// A pool of reusable scratch byte buffers.
///
/// [`BufferPool::get`] hands out an empty buffer that returns itself to the
/// pool when dropped, so early returns and `?` never leak one.
///
/// # Example
/// ```
/// use podsim::BufferPool;
/// use std::io::Write;
///
/// let pool = BufferPool::new(4);
/// {
///     let mut buf = pool.get();
///     write!(buf, "scratch").unwrap();
///     assert_eq!(&buf[..], b"scratch");
/// }
/// assert_eq!(pool.retained(), 1);
/// assert!(pool.get().is_empty());
/// ```
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    limit: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_BUFFERS)
    }
}

impl BufferPool {
    /// Creates a pool that keeps at most `limit` idle buffers.
    pub const fn new(limit: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            limit,
        }
    }

    /// Takes a cleared buffer from the pool, allocating if none is idle.
    pub fn get(&self) -> PooledBuffer<'_> {
        let mut buf = self.buffers.lock().pop().unwrap_or_default();
        buf.clear();
        PooledBuffer { pool: self, buf }
    }

    /// Number of idle buffers currently held.
    pub fn retained(&self) -> usize {
        self.buffers.lock().len()
    }

    fn put(&self, buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.limit {
            buffers.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl std::io::Write for PooledBuffer<'_> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.put(core::mem::take(&mut self.buf));
    }
}
