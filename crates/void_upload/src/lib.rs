//! # void_upload - Sparse Buffer Uploads
//!
//! Batches many small, possibly concurrent writes into a destination buffer:
//! - SparseUploader: staging session owning a ring of scratch frames
//! - ThreadedSparseUploader: lock-free writer handle, `Copy + Send + Sync`
//! - Commit planning: sorting, merging and bounds-checking copy commands
//! - HostBuffer: CPU-resident destination for setup and readback
//!
//! ```
//! use void_upload::prelude::*;
//!
//! let mut uploader = SparseUploader::new(HostBuffer::new(64, 4));
//!
//! let batch = uploader.begin(64 * 4, 64).unwrap();
//! let writer = batch.writer();
//! crossbeam_utils::thread::scope(|s| {
//!     for i in 0..4u32 {
//!         s.spawn(move |_| writer.add_upload(&(i * 10), u64::from(i) * 4));
//!     }
//! })
//! .unwrap();
//! batch.commit().unwrap();
//!
//! assert_eq!(uploader.destination().read::<u32>(3), 30);
//! ```

pub mod commit;
pub mod config;
pub mod destination;
pub mod error;
pub mod operation;
pub mod uploader;
pub mod writer;

pub use commit::plan_copies;
pub use config::{SparseUploaderConfig, DEFAULT_FRAMES_IN_FLIGHT, DEFAULT_MAX_TRANSFER_BYTES};
pub use destination::{DestinationBuffer, HostBuffer};
pub use error::UploadError;
pub use operation::{CopyCommand, UploadOperation};
pub use uploader::{CommitStats, SparseUploader, UploadBatch};
pub use writer::ThreadedSparseUploader;

pub mod prelude {
    pub use crate::destination::{DestinationBuffer, HostBuffer};
    pub use crate::error::UploadError;
    pub use crate::uploader::{CommitStats, SparseUploader, UploadBatch};
    pub use crate::writer::ThreadedSparseUploader;
}
