//! Heap allocator errors

use thiserror::Error;

/// Errors from heap construction and resizing
///
/// Allocation failure is not an error: it is reported by returning an
/// empty [`HeapBlock`](crate::HeapBlock).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("Alignment must be a non-zero power of two, got {0}")]
    InvalidAlignment(u32),

    #[error("Heap capacity {requested} exceeds the maximum of {max}")]
    CapacityTooLarge { requested: u64, max: u64 },

    #[error("Cannot shrink heap to {requested}: addresses up to {in_use_end} are in use")]
    ShrinkBlocked { requested: u64, in_use_end: u64 },
}
