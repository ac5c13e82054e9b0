//! Reusable fixed-size byte buffers.
//!
//! Compression and copy paths need large scratch buffers on every block. A
//! `BufferPoolRegistry` hands out one `BufferPool` per `(length, kind)` pair,
//! and each pool is a small locked stack of buffers of exactly that length.
//!
//! The registry is an ordinary value. Components that want pooled buffers get
//! an `Arc<BufferPoolRegistry>` (usually through `Options::buffer_pools`).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory kind a buffer is tagged with.
///
/// Buffers of different kinds never share a pool, even at equal lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// General purpose scratch memory.
    Heap,
    /// Buffers handed straight to the OS for file I/O.
    Direct,
}

/// A stack of buffers that all have the same length.
///
/// # Thread Safety
///
/// `push` and `pop` take the pool's own lock, so pools of different shapes
/// never contend with each other.
#[derive(Debug)]
pub struct BufferPool {
    buffer_len: usize,
    kind: MemoryKind,
    stack: Mutex<Vec<Vec<u8>>>,
    created: AtomicUsize,
}

impl BufferPool {
    fn new(buffer_len: usize, kind: MemoryKind) -> Self {
        Self {
            buffer_len,
            kind,
            stack: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Take a zeroed buffer, reusing the most recently pushed one if any.
    pub fn pop(&self) -> Vec<u8> {
        let reused = self.stack.lock().pop();
        match reused {
            Some(mut buf) => {
                buf.fill(0);
                buf
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                vec![0u8; self.buffer_len]
            }
        }
    }

    /// Return a buffer to the top of the stack.
    ///
    /// The pool is unbounded. Pushing a buffer of the wrong length is a caller
    /// bug and panics.
    pub fn push(&self, buf: Vec<u8>) {
        assert_eq!(
            buf.len(),
            self.buffer_len,
            "buffer of length {} pushed into a pool of length {}",
            buf.len(),
            self.buffer_len
        );
        self.stack.lock().push(buf);
    }

    /// Length of every buffer in this pool.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Memory kind of this pool.
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Number of buffers this pool has allocated so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of buffers currently parked in the pool.
    pub fn idle(&self) -> usize {
        self.stack.lock().len()
    }
}

impl fmt::Display for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BufferPool(len={}, kind={:?}): created={}",
            self.buffer_len,
            self.kind,
            self.created()
        )
    }
}

/// Registry of buffer pools keyed by `(length, kind)`.
///
/// # Thread Safety
///
/// Lookups are serialized, so concurrent first use of a shape still yields a
/// single pool instance.
#[derive(Debug, Default)]
pub struct BufferPoolRegistry {
    pools: Mutex<HashMap<(usize, MemoryKind), Arc<BufferPool>>>,
}

impl BufferPoolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pool for `(buffer_len, kind)`, creating it on first use.
    pub fn get(&self, buffer_len: usize, kind: MemoryKind) -> Arc<BufferPool> {
        let mut pools = self.pools.lock();
        Arc::clone(
            pools
                .entry((buffer_len, kind))
                .or_insert_with(|| Arc::new(BufferPool::new(buffer_len, kind))),
        )
    }

    /// Number of distinct pools created so far.
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Whether no pool has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_pop_allocates_when_empty() {
        let registry = BufferPoolRegistry::new();
        let pool = registry.get(128, MemoryKind::Heap);

        let buf = pool.pop();
        assert_eq!(buf.len(), 128);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_push_pop_reuses_and_clears() {
        let registry = BufferPoolRegistry::new();
        let pool = registry.get(64, MemoryKind::Heap);

        let mut buf = pool.pop();
        buf.fill(0xAB);
        let ptr = buf.as_ptr();
        pool.push(buf);

        let again = pool.pop();
        assert_eq!(again.as_ptr(), ptr);
        assert!(again.iter().all(|&b| b == 0));
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_stack_order() {
        let registry = BufferPoolRegistry::new();
        let pool = registry.get(8, MemoryKind::Heap);

        let first = pool.pop();
        let second = pool.pop();
        let first_ptr = first.as_ptr();
        let second_ptr = second.as_ptr();
        pool.push(first);
        pool.push(second);

        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.pop().as_ptr(), second_ptr);
        assert_eq!(pool.pop().as_ptr(), first_ptr);
    }

    #[test]
    fn test_kinds_are_separate() {
        let registry = BufferPoolRegistry::new();
        let heap = registry.get(32, MemoryKind::Heap);
        let direct = registry.get(32, MemoryKind::Direct);

        assert!(!Arc::ptr_eq(&heap, &direct));
        assert!(Arc::ptr_eq(&heap, &registry.get(32, MemoryKind::Heap)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    #[should_panic(expected = "pushed into a pool of length")]
    fn test_push_wrong_length() {
        let registry = BufferPoolRegistry::new();
        let pool = registry.get(16, MemoryKind::Heap);
        pool.push(vec![0u8; 17]);
    }

    #[test]
    fn test_concurrent_first_use_single_instance() {
        let registry = Arc::new(BufferPoolRegistry::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let pool = registry.get(4096, MemoryKind::Direct);
                    let buf = pool.pop();
                    pool.push(buf);
                    pool
                })
            })
            .collect();

        let pools: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for pool in &pools[1..] {
            assert!(Arc::ptr_eq(&pools[0], pool));
        }
        assert_eq!(registry.len(), 1);
        assert!(pools[0].created() <= 8);
    }
}
