//! net/buffer_pool.rs
//!
//! Fixed-size read buffers shared by the frame pumps and the handlers that
//! drain their queues. A buffer goes back to the pool when its `PooledBuf`
//! guard drops; its contents are cleared before anyone sees it again.

use std::ops::Deref;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

const DEFAULT_MAX_IDLE: usize = 256;

// -----------------------------------------------------------------------------
// ----- BufferPool ------------------------------------------------------------

#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Arc<Self> {
        Self::with_max_idle(buffer_size, DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(buffer_size: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size: buffer_size.max(1),
            max_idle,
            idle: Mutex::new(Vec::new()),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- BufferPool: Public ----------------------------------------------------

impl BufferPool {
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Hands out an empty buffer with at least `buffer_size` spare capacity.
    pub fn acquire(self: &Arc<Self>) -> PooledBuf {
        let buf = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size));

        PooledBuf {
            pool: self.clone(),
            buf,
        }
    }

    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();

        // A buffer that was split or reallocated no longer has the pool's shape.
        if buf.capacity() < self.buffer_size {
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PooledBuf -------------------------------------------------------------

#[derive(Debug)]
pub struct PooledBuf {
    pool: Arc<BufferPool>,
    buf: BytesMut,
}

impl PooledBuf {
    /// Room left before the buffer reaches the pool's frame size.
    pub fn remaining(&self) -> usize {
        self.pool.buffer_size.saturating_sub(self.len())
    }

    /// Mutable access for `read_buf`. Callers must not read past `remaining()`
    /// or the buffer will grow and be dropped instead of recycled.
    pub fn inner_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_gives_empty_buffer_with_capacity() {
        let pool = BufferPool::new(64);
        assert_eq!(pool.buffer_size(), 64);
        let mut buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(buf.remaining(), 64);
        assert!(buf.inner_mut().capacity() >= 64);
    }

    #[test]
    fn dropped_buffer_returns_cleared() {
        let pool = BufferPool::new(16);
        {
            let mut buf = pool.acquire();
            buf.inner_mut().extend_from_slice(b"stale");
            assert_eq!(&buf[..], b"stale");
        }
        assert_eq!(pool.idle_count(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn idle_list_is_capped() {
        let pool = BufferPool::with_max_idle(8, 2);
        let bufs: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        drop(bufs);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn concurrent_use_from_threads() {
        let pool = BufferPool::with_max_idle(32, 64);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.acquire();
                        assert!(buf.is_empty());
                        buf.inner_mut().extend_from_slice(&[i as u8; 8]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.idle_count() <= 8);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
