//! Upload errors

use thiserror::Error;

/// Recoverable failures of the upload path
///
/// Running out of the scratch or operation capacity declared at
/// [`begin`](crate::SparseUploader::begin) is not reported here: producers
/// cannot recover from it mid-batch, so it panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Invalid uploader configuration: {0}")]
    InvalidConfig(String),

    #[error("Transfer of {requested} bytes exceeds the limit of {limit} bytes")]
    TransferTooLarge { requested: u64, limit: u64 },

    #[error("Write of {size} bytes at offset {offset} exceeds destination of {capacity} bytes")]
    DestinationOutOfBounds { offset: u64, size: u64, capacity: u64 },

    #[error("Read of {size} bytes at offset {offset} exceeds the {written} staged bytes")]
    ScratchOutOfBounds { offset: u64, size: u64, written: u64 },

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}
