//! Sparse uploader configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::UploadError;

/// Scratch frames cycled through before one is reused
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// Largest batch accepted by default (32-bit offsets)
pub const DEFAULT_MAX_TRANSFER_BYTES: u64 = u32::MAX as u64;

/// Sparse uploader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SparseUploaderConfig {
    /// Number of scratch frames in the ring
    pub frames_in_flight: usize,
    /// Upper bound on the scratch bytes a single batch may declare
    pub max_transfer_bytes: u64,
    /// Merge uploads that are contiguous in scratch and destination
    pub coalesce_copies: bool,
}

impl SparseUploaderConfig {
    /// Check the configuration for values the uploader cannot work with
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.frames_in_flight == 0 {
            return Err(UploadError::InvalidConfig(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        if self.max_transfer_bytes == 0 {
            return Err(UploadError::InvalidConfig(
                "max_transfer_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SparseUploaderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            max_transfer_bytes: DEFAULT_MAX_TRANSFER_BYTES,
            coalesce_copies: true,
        }
    }
}
