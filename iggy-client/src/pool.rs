//! Scratch buffer pooling for batch composition
//!
//! The dispatcher rents one message buffer per batch it composes. Rentals are
//! RAII guards: a buffer goes back to the pool when the guard drops, on every
//! exit path including early returns and unwinding.

use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::protocol::Message;

struct PoolInner {
    buffers: SegQueue<Vec<Message>>,
    buffer_capacity: usize,
    max_idle: usize,
    idle: AtomicUsize,
    outstanding: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

/// Lock-free pool of `Vec<Message>` buffers sized to one batch
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Pool whose buffers hold `buffer_capacity` messages without reallocating
    pub fn new(buffer_capacity: usize, max_idle: usize) -> Self {
        let buffers = SegQueue::new();

        // Pre-populate a few buffers so the first ticks don't allocate
        let initial = std::cmp::min(max_idle, 4);
        for _ in 0..initial {
            buffers.push(Vec::with_capacity(buffer_capacity));
        }

        Self {
            inner: Arc::new(PoolInner {
                buffers,
                buffer_capacity,
                max_idle,
                idle: AtomicUsize::new(initial),
                outstanding: AtomicUsize::new(0),
                hits: AtomicUsize::new(0),
                misses: AtomicUsize::new(0),
            }),
        }
    }

    /// Rent an empty buffer
    pub fn rent(&self) -> PooledBuffer {
        let buffer = match self.inner.buffers.pop() {
            Some(buffer) => {
                self.inner.idle.fetch_sub(1, Ordering::Relaxed);
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.inner.buffer_capacity)
            }
        };
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);

        PooledBuffer {
            buffer,
            pool: Arc::clone(&self.inner),
        }
    }

    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }

    pub fn stats(&self) -> PoolStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        PoolStats {
            hits,
            misses,
            hit_ratio: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
            idle: self.inner.idle.load(Ordering::Relaxed),
            outstanding: self.inner.outstanding.load(Ordering::Relaxed),
            max_idle: self.inner.max_idle,
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_capacity", &self.inner.buffer_capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl PoolInner {
    fn give_back(&self, mut buffer: Vec<Message>) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        buffer.clear();

        // Oversized buffers and anything past the idle limit are dropped
        if buffer.capacity() > self.buffer_capacity.saturating_mul(2) {
            return;
        }
        if self.idle.load(Ordering::Relaxed) < self.max_idle {
            self.buffers.push(buffer);
            self.idle.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A rented buffer; returns itself to the pool on drop
pub struct PooledBuffer {
    buffer: Vec<Message>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Move the collected messages out, leaving the rented capacity behind
    pub fn take_messages(&mut self) -> Vec<Message> {
        let mut taken = Vec::with_capacity(self.buffer.len());
        taken.append(&mut self.buffer);
        taken
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.pool.give_back(buffer);
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<Message>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub hits: usize,
    pub misses: usize,
    pub hit_ratio: f64,
    pub idle: usize,
    /// Buffers rented and not yet returned
    pub outstanding: usize,
    pub max_idle: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_and_return() {
        let pool = BufferPool::new(8, 2);
        {
            let mut buffer = pool.rent();
            buffer.push(Message::new("a"));
            assert_eq!(pool.stats().outstanding, 1);
        }
        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.hits, 1);

        let buffer = pool.rent();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 8);
    }

    #[test]
    fn test_miss_when_empty() {
        let pool = BufferPool::new(4, 0);
        let _a = pool.rent();
        let _b = pool.rent();
        let stats = pool.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.outstanding, 2);
    }

    #[test]
    fn test_idle_limit() {
        let pool = BufferPool::new(4, 1);
        let a = pool.rent();
        let b = pool.rent();
        drop(a);
        drop(b);
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_returned_on_panic() {
        let pool = BufferPool::new(4, 4);
        let cloned = pool.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _buffer = cloned.rent();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_take_messages_keeps_order() {
        let pool = BufferPool::new(4, 4);
        let mut buffer = pool.rent();
        buffer.push(Message::with_id(1, "a"));
        buffer.push(Message::with_id(2, "b"));
        let taken = buffer.take_messages();
        assert_eq!(taken.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(buffer.is_empty());
    }
}
