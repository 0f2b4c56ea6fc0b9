//! Heap configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a [`HeapAllocator`](crate::HeapAllocator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HeapConfig {
    /// Number of addressable units managed by the heap
    pub capacity: u64,
    /// Every allocation is rounded up to, and aligned on, a multiple of this
    pub minimum_alignment: u32,
}

impl HeapConfig {
    /// Config for a heap of `capacity` units with byte granularity
    pub const fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            minimum_alignment: 1,
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
