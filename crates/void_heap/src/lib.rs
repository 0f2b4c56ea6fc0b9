//! # void_heap - Range Heap Allocator
//!
//! Fixed-capacity allocator over abstract integer addresses. Hands out
//! [`HeapBlock`] ranges with best-fit placement and merges released ranges
//! with their free neighbours immediately, so repeated allocate/release
//! cycles never leave the heap permanently fragmented.
//!
//! Typical use is sub-allocating a GPU buffer: the heap decides where each
//! piece of data lives, and the upload path writes it there.
//!
//! ```
//! use void_heap::HeapAllocator;
//!
//! let mut heap = HeapAllocator::new(100);
//! let blocks: Vec<_> = (0..10).map(|_| heap.allocate(10)).collect();
//! assert!(heap.is_full());
//!
//! for block in blocks {
//!     heap.release(block);
//! }
//! assert_eq!(heap.allocate(100).len(), 100);
//! ```

pub mod allocator;
pub mod block;
pub mod config;
pub mod error;
pub mod shared;

pub use allocator::{HeapAllocator, HeapStats, MAX_CAPACITY};
pub use block::HeapBlock;
pub use config::HeapConfig;
pub use error::HeapError;
pub use shared::SharedHeapAllocator;

pub mod prelude {
    pub use crate::{HeapAllocator, HeapBlock, HeapConfig, HeapError, SharedHeapAllocator};
}
