//! Heap allocator - best-fit range allocation with immediate coalescing
//!
//! The allocator manages abstract integer addresses rather than memory, so
//! it can sub-allocate GPU buffers, descriptor tables or anything else that
//! is addressed by offset. Free ranges are kept in size bins sorted by
//! size class, and both endpoints of every free range are indexed so a
//! released block can be merged with its neighbours in O(1).

use std::collections::HashMap;

use crate::{HeapBlock, HeapConfig, HeapError};

/// Low bits of a size class hold the log2 alignment of the range begin
const ALIGNMENT_BITS: u32 = 6;
const MAX_ALIGNMENT_LOG2: u32 = (1 << ALIGNMENT_BITS) - 1;

/// Largest capacity whose size classes still fit in 64 bits
pub const MAX_CAPACITY: u64 = u64::MAX >> ALIGNMENT_BITS;

/// Round `value` up to the next multiple of `1 << alignment_log2`
#[inline]
const fn align_up(value: u64, alignment_log2: u32) -> u64 {
    let mask = (1u64 << alignment_log2) - 1;
    (value + mask) & !mask
}

/// Ordering key of a free range: length first, then begin alignment
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SizeClass(u64);

impl SizeClass {
    #[inline]
    fn new(size: u64, alignment_log2: u32) -> Self {
        Self((size << ALIGNMENT_BITS) | u64::from(alignment_log2.min(MAX_ALIGNMENT_LOG2)))
    }

    #[inline]
    fn of_block(block: HeapBlock) -> Self {
        Self::new(block.len(), block.begin().trailing_zeros())
    }

    #[inline]
    fn size(self) -> u64 {
        self.0 >> ALIGNMENT_BITS
    }

    #[inline]
    fn alignment_log2(self) -> u32 {
        (self.0 & u64::from(MAX_ALIGNMENT_LOG2)) as u32
    }
}

/// All free ranges sharing one size class
#[derive(Debug)]
struct SizeBin {
    class: SizeClass,
    blocks: Vec<HeapBlock>,
}

/// Best-fit heap allocator
///
/// Allocation picks the smallest free range that satisfies the request and
/// splits off the remainder. Release merges the block with any free
/// neighbours before it re-enters the free set, so no two free ranges are
/// ever adjacent and the heap can always be fully recovered.
///
/// Not thread-safe: wrap it in a [`SharedHeapAllocator`](crate::SharedHeapAllocator)
/// when several threads manage the same layout.
#[derive(Debug)]
pub struct HeapAllocator {
    /// Free ranges grouped by size class, sorted ascending
    bins: Vec<SizeBin>,
    /// begin -> end and end -> begin for every free range
    free_endpoints: HashMap<u64, u64>,
    capacity: u64,
    free: u64,
    minimum_alignment_log2: u32,
}

impl HeapAllocator {
    /// Create an allocator managing `[0, capacity)` with byte granularity
    ///
    /// # Panics
    /// If `capacity` exceeds [`MAX_CAPACITY`]. The fallible constructors
    /// ([`with_alignment`](Self::with_alignment),
    /// [`from_config`](Self::from_config)) report the same condition as
    /// [`HeapError::CapacityTooLarge`].
    pub fn new(capacity: u64) -> Self {
        assert!(
            capacity <= MAX_CAPACITY,
            "heap capacity {} exceeds the maximum of {}",
            capacity,
            MAX_CAPACITY
        );
        Self::create(capacity, 0)
    }

    /// Create an allocator whose allocations are multiples of `minimum_alignment`
    pub fn with_alignment(capacity: u64, minimum_alignment: u32) -> Result<Self, HeapError> {
        if !minimum_alignment.is_power_of_two() {
            return Err(HeapError::InvalidAlignment(minimum_alignment));
        }
        if capacity > MAX_CAPACITY {
            return Err(HeapError::CapacityTooLarge {
                requested: capacity,
                max: MAX_CAPACITY,
            });
        }
        Ok(Self::create(capacity, minimum_alignment.trailing_zeros()))
    }

    /// Create an allocator from a [`HeapConfig`]
    pub fn from_config(config: &HeapConfig) -> Result<Self, HeapError> {
        Self::with_alignment(config.capacity, config.minimum_alignment)
    }

    fn create(capacity: u64, minimum_alignment_log2: u32) -> Self {
        let mut heap = Self {
            bins: Vec::new(),
            free_endpoints: HashMap::new(),
            capacity,
            free: 0,
            minimum_alignment_log2,
        };
        heap.insert_free(HeapBlock::new(0, capacity));
        heap
    }

    /// Total number of managed units
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Sum of the lengths of all free ranges
    #[inline]
    pub fn free_space(&self) -> u64 {
        self.free
    }

    /// Units currently handed out
    #[inline]
    pub fn used_space(&self) -> u64 {
        self.capacity - self.free
    }

    /// Nothing is allocated
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free == self.capacity
    }

    /// No free space is left
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free == 0
    }

    /// Granularity every allocation is rounded to
    #[inline]
    pub fn minimum_alignment(&self) -> u32 {
        1 << self.minimum_alignment_log2
    }

    /// Allocate at least `size` units
    ///
    /// Returns an empty block when no free range is large enough. The
    /// returned block may be longer than requested if `size` is not a
    /// multiple of the minimum alignment.
    pub fn allocate(&mut self, size: u64) -> HeapBlock {
        self.allocate_aligned(size, 1)
    }

    /// [`allocate`](Self::allocate), with `None` instead of an empty block
    pub fn try_allocate(&mut self, size: u64) -> Option<HeapBlock> {
        let block = self.allocate(size);
        (!block.is_empty()).then_some(block)
    }

    /// Allocate at least `size` units starting at a multiple of `alignment`
    ///
    /// `alignment` must be a power of two; it is raised to the minimum
    /// alignment when smaller.
    pub fn allocate_aligned(&mut self, size: u64, alignment: u32) -> HeapBlock {
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment must be a power of two, got {}",
            alignment
        );

        if size == 0 || size > self.free {
            return HeapBlock::EMPTY;
        }

        let size = align_up(size, self.minimum_alignment_log2);
        let alignment_log2 = alignment.max(1).trailing_zeros().max(self.minimum_alignment_log2);
        let request = SizeClass::new(size, alignment_log2);

        let mut index = self.find_bin(request);
        while index < self.bins.len() {
            if Self::can_fit(request, self.bins[index].class) {
                if let Some(block) = self.pop_block(index) {
                    return self.cut(request, block);
                }
            }
            index += 1;
        }

        log::trace!(
            "Heap allocation of {} (alignment {}) failed with {} of {} free",
            size,
            1u64 << alignment_log2,
            self.free,
            self.capacity
        );
        HeapBlock::EMPTY
    }

    /// Return a block to the heap, merging it with free neighbours
    ///
    /// The block must have come from this allocator and must not have been
    /// released already. Violations are caught by debug assertions only.
    /// Releasing an empty block does nothing.
    pub fn release(&mut self, block: HeapBlock) {
        debug_assert!(
            block.end() <= self.capacity,
            "block {} lies outside a heap of capacity {}",
            block,
            self.capacity
        );
        self.insert_free(block);
    }

    /// Forget every allocation, leaving one free range over the whole heap
    pub fn clear(&mut self) {
        self.bins.clear();
        self.free_endpoints.clear();
        self.free = 0;
        self.insert_free(HeapBlock::new(0, self.capacity));
        log::trace!("Cleared heap of capacity {}", self.capacity);
    }

    /// Grow or shrink the managed address space
    ///
    /// Growing always succeeds. Shrinking succeeds only when everything past
    /// `new_capacity` is free; otherwise the heap is left unchanged.
    pub fn resize(&mut self, new_capacity: u64) -> Result<(), HeapError> {
        if new_capacity > MAX_CAPACITY {
            return Err(HeapError::CapacityTooLarge {
                requested: new_capacity,
                max: MAX_CAPACITY,
            });
        }

        let old_capacity = self.capacity;
        if new_capacity > old_capacity {
            self.capacity = new_capacity;
            self.insert_free(HeapBlock::new(old_capacity, new_capacity));
        } else if new_capacity < old_capacity {
            let tail_begin = match self.free_endpoints.get(&old_capacity) {
                Some(&begin) if begin <= new_capacity => begin,
                Some(&begin) => {
                    return Err(HeapError::ShrinkBlocked {
                        requested: new_capacity,
                        in_use_end: begin,
                    })
                }
                None => {
                    return Err(HeapError::ShrinkBlocked {
                        requested: new_capacity,
                        in_use_end: old_capacity,
                    })
                }
            };

            self.remove_free(HeapBlock::new(tail_begin, old_capacity));
            self.capacity = new_capacity;
            self.insert_free(HeapBlock::new(tail_begin, new_capacity));
        } else {
            return Ok(());
        }

        log::debug!("Resized heap from {} to {}", old_capacity, new_capacity);
        Ok(())
    }

    /// Release the allocator's bookkeeping storage
    pub fn dispose(self) {
        log::trace!(
            "Disposing heap: {} of {} in use across {} size bins",
            self.used_space(),
            self.capacity,
            self.bins.len()
        );
    }

    /// Iterate over all free ranges in no particular order
    pub fn free_blocks(&self) -> impl Iterator<Item = HeapBlock> + '_ {
        self.bins.iter().flat_map(|bin| bin.blocks.iter().copied())
    }

    /// Get allocation statistics
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            capacity: self.capacity,
            used: self.used_space(),
            free: self.free,
            free_blocks: self.bins.iter().map(|bin| bin.blocks.len()).sum(),
            largest_free_block: self.bins.last().map(|bin| bin.class.size()).unwrap_or(0),
            size_bins: self.bins.len(),
        }
    }

    /// Index of the first bin whose class is not smaller than `class`
    #[inline]
    fn find_bin(&self, class: SizeClass) -> usize {
        self.bins.partition_point(|bin| bin.class < class)
    }

    fn can_fit(request: SizeClass, bin: SizeClass) -> bool {
        debug_assert!(bin >= request);

        if bin.alignment_log2() >= request.alignment_log2() {
            true
        } else {
            // Misaligned ranges need one alignment worth of slack.
            bin.size() >= request.size() + (1u64 << request.alignment_log2())
        }
    }

    fn pop_block(&mut self, index: usize) -> Option<HeapBlock> {
        let block = self.bins[index].blocks.pop()?;
        self.free_endpoints.remove(&block.begin());
        self.free_endpoints.remove(&block.end());
        self.free -= block.len();
        self.remove_bin_if_empty(index);
        Some(block)
    }

    /// Carve the requested range out of a free block, returning the rest
    fn cut(&mut self, request: SizeClass, block: HeapBlock) -> HeapBlock {
        debug_assert!(block.len() >= request.size(), "block {} is too small", block);

        if block.len() == request.size() {
            return block;
        }

        let begin = align_up(block.begin(), request.alignment_log2());
        let end = begin + request.size();
        debug_assert!(end <= block.end());

        if begin > block.begin() {
            self.insert_free(HeapBlock::new(block.begin(), begin));
        }
        if end < block.end() {
            self.insert_free(HeapBlock::new(end, block.end()));
        }

        HeapBlock::new(begin, end)
    }

    fn insert_free(&mut self, block: HeapBlock) {
        if block.is_empty() {
            return;
        }

        let block = self.coalesce(block);
        let class = SizeClass::of_block(block);
        let index = self.find_bin(class);

        if index == self.bins.len() || self.bins[index].class != class {
            self.bins.insert(
                index,
                SizeBin {
                    class,
                    blocks: Vec::new(),
                },
            );
        }
        self.bins[index].blocks.push(block);
        self.free += block.len();

        debug_assert!(!self.free_endpoints.contains_key(&block.begin()));
        debug_assert!(!self.free_endpoints.contains_key(&block.end()));
        self.free_endpoints.insert(block.begin(), block.end());
        self.free_endpoints.insert(block.end(), block.begin());
    }

    fn remove_free(&mut self, block: HeapBlock) {
        self.free_endpoints.remove(&block.begin());
        self.free_endpoints.remove(&block.end());

        let class = SizeClass::of_block(block);
        let index = self.find_bin(class);

        let removed = match self.bins.get_mut(index) {
            Some(bin) if bin.class == class => {
                match bin.blocks.iter().position(|candidate| *candidate == block) {
                    Some(position) => {
                        bin.blocks.swap_remove(position);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        };
        debug_assert!(removed, "free block {} missing from its size bin", block);

        if removed {
            self.free -= block.len();
            self.remove_bin_if_empty(index);
        }
    }

    fn remove_bin_if_empty(&mut self, index: usize) {
        if self.bins[index].blocks.is_empty() {
            self.bins.remove(index);
        }
    }

    fn coalesce(&mut self, block: HeapBlock) -> HeapBlock {
        let block = self.coalesce_at(block, block.begin());
        self.coalesce_at(block, block.end())
    }

    /// Merge `block` with the free range touching `endpoint`, if any
    fn coalesce_at(&mut self, block: HeapBlock, endpoint: u64) -> HeapBlock {
        let other_end = match self.free_endpoints.get(&endpoint) {
            Some(&other_end) => other_end,
            None => return block,
        };

        debug_assert!(
            !(other_end.min(endpoint) == block.begin() && other_end.max(endpoint) == block.end()),
            "block {} was already released",
            block
        );

        if endpoint == block.begin() {
            debug_assert!(other_end < endpoint, "block {} overlaps a free range", block);
            let neighbour = HeapBlock::new(other_end, block.begin());
            self.remove_free(neighbour);
            HeapBlock::new(neighbour.begin(), block.end())
        } else {
            debug_assert!(other_end > endpoint, "block {} overlaps a free range", block);
            let neighbour = HeapBlock::new(block.end(), other_end);
            self.remove_free(neighbour);
            HeapBlock::new(block.begin(), neighbour.end())
        }
    }
}

/// Heap allocator statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub capacity: u64,
    pub used: u64,
    pub free: u64,
    pub free_blocks: usize,
    pub largest_free_block: u64,
    pub size_bins: usize,
}
