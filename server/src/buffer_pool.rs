//! Reusable receive buffers
//!
//! The receive loop rents one buffer per datagram instead of allocating. A
//! rented buffer is a [`PooledBuffer`]: a move-only handle that gives its
//! memory back to the pool when dropped. Because returning consumes the
//! handle, a buffer cannot be returned twice or used after it went back, and
//! every exit path (including errors and unwinding) returns it exactly once.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Counters for checking that every rent is matched by a return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub rented: u64,
    pub returned: u64,
    pub idle: usize,
}

impl PoolStats {
    pub fn outstanding(&self) -> u64 {
        self.rented.saturating_sub(self.returned)
    }
}

struct PoolInner {
    buffer_size: usize,
    max_pooled: usize,
    free: Mutex<Vec<Box<[u8]>>>,
    rented: AtomicU64,
    returned: AtomicU64,
}

impl PoolInner {
    fn free_list(&self) -> MutexGuard<'_, Vec<Box<[u8]>>> {
        // The list is always valid even if a holder panicked
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn give_back(&self, data: Box<[u8]>) {
        if data.len() == self.buffer_size {
            let mut free = self.free_list();
            if free.len() < self.max_pooled {
                free.push(data);
            }
        }
        self.returned.fetch_add(1, Ordering::AcqRel);
    }
}

/// Shared pool of fixed-size byte buffers. Cloning shares the same pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                max_pooled,
                free: Mutex::new(Vec::new()),
                rented: AtomicU64::new(0),
                returned: AtomicU64::new(0),
            }),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Rents a buffer holding at least `size` bytes
    ///
    /// Requests up to the pool's buffer size are served from the free list.
    /// Larger requests get a one-off allocation that is counted like any
    /// other rent but dropped instead of pooled when returned.
    pub fn rent(&self, size: usize) -> PooledBuffer {
        let data = if size <= self.inner.buffer_size {
            self.inner
                .free_list()
                .pop()
                .unwrap_or_else(|| vec![0u8; self.inner.buffer_size].into_boxed_slice())
        } else {
            vec![0u8; size].into_boxed_slice()
        };

        self.inner.rented.fetch_add(1, Ordering::AcqRel);

        PooledBuffer {
            data: Some(data),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Snapshot of the counters
    ///
    /// `returned` is read before `rented`, so a snapshot taken while other
    /// threads are churning never shows more returns than rents.
    pub fn stats(&self) -> PoolStats {
        let returned = self.inner.returned.load(Ordering::Acquire);
        let rented = self.inner.rented.load(Ordering::Acquire);
        PoolStats {
            rented,
            returned,
            idle: self.inner.free_list().len(),
        }
    }
}

/// Exclusive handle to a rented buffer
pub struct PooledBuffer {
    data: Option<Box<[u8]>>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Returns the buffer to its pool now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.give_back(data);
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .finish()
    }
}
