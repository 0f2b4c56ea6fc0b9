//! Recorded uploads and the copy commands they turn into

use core::ops::Range;

/// One pending write recorded during a batch
///
/// `size` bytes at `staging_offset` in the batch scratch are written to
/// `destination_offset`, `repeat_count` times back to back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UploadOperation {
    pub staging_offset: u64,
    pub destination_offset: u64,
    pub size: u64,
    pub repeat_count: u32,
}

/// A copy instruction issued to a [`DestinationBuffer`](crate::DestinationBuffer)
///
/// Produced at commit time from one or more merged [`UploadOperation`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CopyCommand {
    /// Byte offset of the source range in the batch scratch
    pub source_offset: u64,
    /// Byte offset of the first write in the destination
    pub destination_offset: u64,
    /// Length of the source range in bytes
    pub size: u64,
    /// Number of back-to-back copies of the source range
    pub repeat_count: u32,
}

impl CopyCommand {
    /// Bytes of the destination this command overwrites
    #[inline]
    pub fn destination_len(&self) -> u64 {
        self.size * u64::from(self.repeat_count)
    }

    /// Source range within the scratch
    #[inline]
    pub fn source_range(&self) -> Range<usize> {
        self.source_offset as usize..(self.source_offset + self.size) as usize
    }

    /// Whether `next` continues this command in both scratch and destination
    ///
    /// Ranges whose end overflows never merge; they are left for the bounds
    /// check to reject.
    #[inline]
    pub(crate) fn can_append(&self, next: &CopyCommand) -> bool {
        self.repeat_count == 1
            && next.repeat_count == 1
            && self.source_offset.checked_add(self.size) == Some(next.source_offset)
            && self.destination_offset.checked_add(self.size) == Some(next.destination_offset)
    }
}

impl From<UploadOperation> for CopyCommand {
    fn from(operation: UploadOperation) -> Self {
        Self {
            source_offset: operation.staging_offset,
            destination_offset: operation.destination_offset,
            size: operation.size,
            repeat_count: operation.repeat_count.max(1),
        }
    }
}
