//! Heap blocks - half-open address ranges handed out by the allocator

use core::fmt;
use core::ops::Range;

/// A contiguous range `[begin, end)` inside a heap
///
/// Blocks are plain values. Whoever receives one from
/// [`HeapAllocator::allocate`](crate::HeapAllocator::allocate) is responsible
/// for releasing it exactly once. The default block is the empty block
/// `(0, 0)`, which is also what a failed allocation returns.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapBlock {
    begin: u64,
    end: u64,
}

impl HeapBlock {
    /// The empty block
    pub const EMPTY: Self = Self { begin: 0, end: 0 };

    /// Create a block from its endpoints
    #[inline]
    pub const fn new(begin: u64, end: u64) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    /// Create a block starting at `begin` spanning `size` units
    #[inline]
    pub const fn of_size(begin: u64, size: u64) -> Self {
        Self::new(begin, begin + size)
    }

    /// First address of the block
    #[inline]
    pub const fn begin(&self) -> u64 {
        self.begin
    }

    /// One past the last address of the block
    #[inline]
    pub const fn end(&self) -> u64 {
        self.end
    }

    /// Number of units covered
    #[inline]
    pub const fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// Whether the block covers nothing
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// The block as a `Range`
    #[inline]
    pub const fn range(&self) -> Range<u64> {
        self.begin..self.end
    }

    /// Whether two blocks share at least one address
    #[inline]
    pub const fn overlaps(&self, other: &HeapBlock) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

impl fmt::Debug for HeapBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapBlock({}, {}; len = {})", self.begin, self.end, self.len())
    }
}

impl fmt::Display for HeapBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.begin, self.end)
    }
}
