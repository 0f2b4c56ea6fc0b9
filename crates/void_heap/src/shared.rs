//! Mutex-guarded heap for layouts managed from several threads

use parking_lot::{Mutex, MutexGuard};

use crate::{HeapAllocator, HeapBlock, HeapStats};

/// A [`HeapAllocator`] behind a `parking_lot` mutex
///
/// The allocator itself is single-threaded. This wrapper is the external
/// synchronization callers are expected to add when allocation and release
/// happen on different threads.
pub struct SharedHeapAllocator {
    inner: Mutex<HeapAllocator>,
}

impl SharedHeapAllocator {
    /// Wrap an existing allocator
    pub fn new(heap: HeapAllocator) -> Self {
        Self {
            inner: Mutex::new(heap),
        }
    }

    /// Create a shared allocator of the given capacity
    pub fn with_capacity(capacity: u64) -> Self {
        Self::new(HeapAllocator::new(capacity))
    }

    /// See [`HeapAllocator::allocate`]
    pub fn allocate(&self, size: u64) -> HeapBlock {
        self.inner.lock().allocate(size)
    }

    /// See [`HeapAllocator::allocate_aligned`]
    pub fn allocate_aligned(&self, size: u64, alignment: u32) -> HeapBlock {
        self.inner.lock().allocate_aligned(size, alignment)
    }

    /// See [`HeapAllocator::release`]
    pub fn release(&self, block: HeapBlock) {
        self.inner.lock().release(block);
    }

    pub fn free_space(&self) -> u64 {
        self.inner.lock().free_space()
    }

    pub fn stats(&self) -> HeapStats {
        self.inner.lock().stats()
    }

    /// Lock the allocator for a sequence of operations
    pub fn lock(&self) -> MutexGuard<'_, HeapAllocator> {
        self.inner.lock()
    }

    /// Unwrap the allocator
    pub fn into_inner(self) -> HeapAllocator {
        self.inner.into_inner()
    }
}
