//! Staging sessions
//!
//! A [`SparseUploader`] owns its destination and a ring of scratch frames.
//! Each [`begin`](SparseUploader::begin) takes the current frame out of the
//! ring and hands it to an [`UploadBatch`], the recording phase. Producers
//! record through copies of the batch's [`ThreadedSparseUploader`]; once
//! they are done, [`UploadBatch::commit`] plans, validates and issues the
//! copies and the ring advances.

use log::{debug, warn};

use crate::commit::{plan_copies, validate};
use crate::writer::RecordingState;
use crate::{
    DestinationBuffer, SparseUploaderConfig, ThreadedSparseUploader, UploadError, UploadOperation,
};

/// Scratch storage of one in-flight frame
#[derive(Default)]
struct StagingFrame {
    data: Vec<u8>,
    operations: Vec<UploadOperation>,
}

impl StagingFrame {
    /// Make room for a batch, growing but never shrinking
    fn reserve(&mut self, slot: usize, max_bytes: usize, max_operations: usize) {
        if self.data.len() < max_bytes {
            debug!(
                "Staging frame {} scratch grows {} -> {} bytes",
                slot,
                self.data.len(),
                max_bytes
            );
            self.data.resize(max_bytes, 0);
        }
        if self.operations.len() < max_operations {
            self.operations.resize(max_operations, UploadOperation::default());
        }
    }
}

/// Summary of a committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Operations recorded by producers
    pub operations: usize,
    /// Copy commands issued after merging
    pub copies: usize,
    /// Scratch bytes staged
    pub staged_bytes: usize,
    /// Destination bytes written, counting repeats
    pub written_bytes: u64,
}

/// Batches sparse writes into a destination buffer
///
/// ```
/// use void_upload::{HostBuffer, SparseUploader};
///
/// let mut uploader = SparseUploader::new(HostBuffer::new(16, 4));
///
/// let batch = uploader.begin(64, 16).unwrap();
/// let writer = batch.writer();
/// writer.add_upload(&7u32, 4 * 4);
/// writer.add_splat(&1u32, 8 * 4, 8);
/// batch.commit().unwrap();
///
/// assert_eq!(uploader.destination().read::<u32>(4), 7);
/// assert_eq!(uploader.destination().read::<u32>(15), 1);
/// ```
pub struct SparseUploader<D: DestinationBuffer> {
    destination: D,
    config: SparseUploaderConfig,
    frames: Vec<StagingFrame>,
    current_frame: usize,
    batches_committed: u64,
}

impl<D: DestinationBuffer> SparseUploader<D> {
    /// Create an uploader with the default configuration
    pub fn new(destination: D) -> Self {
        let config = SparseUploaderConfig::default();
        Self::build(destination, config)
    }

    /// Create an uploader with a custom configuration
    pub fn with_config(destination: D, config: SparseUploaderConfig) -> Result<Self, UploadError> {
        config.validate()?;
        Ok(Self::build(destination, config))
    }

    fn build(destination: D, config: SparseUploaderConfig) -> Self {
        let frames = (0..config.frames_in_flight)
            .map(|_| StagingFrame::default())
            .collect();

        Self {
            destination,
            config,
            frames,
            current_frame: 0,
            batches_committed: 0,
        }
    }

    /// Start a recording phase
    ///
    /// `max_bytes` bounds the scratch bytes and `max_operations` the number
    /// of operations the batch may record.
    pub fn begin(
        &mut self,
        max_bytes: usize,
        max_operations: usize,
    ) -> Result<UploadBatch<'_, D>, UploadError> {
        if max_bytes as u64 > self.config.max_transfer_bytes {
            return Err(UploadError::TransferTooLarge {
                requested: max_bytes as u64,
                limit: self.config.max_transfer_bytes,
            });
        }

        let slot = self.current_frame;
        let mut frame = std::mem::take(&mut self.frames[slot]);
        frame.reserve(slot, max_bytes, max_operations);

        // SAFETY: the frame holds at least `max_bytes` bytes and
        // `max_operations` slots, and it moves into the batch together with
        // the state, so nothing else touches it until the batch drops.
        let state = unsafe {
            RecordingState::new(
                frame.data.as_mut_ptr(),
                max_bytes,
                frame.operations.as_mut_ptr(),
                max_operations,
            )
        };

        Ok(UploadBatch {
            uploader: self,
            frame,
            state,
            committed: false,
            finished: false,
        })
    }

    #[inline]
    pub fn destination(&self) -> &D {
        &self.destination
    }

    #[inline]
    pub fn destination_mut(&mut self) -> &mut D {
        &mut self.destination
    }

    pub fn into_destination(self) -> D {
        self.destination
    }

    #[inline]
    pub fn config(&self) -> &SparseUploaderConfig {
        &self.config
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Index of the frame the next batch records into
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn batches_committed(&self) -> u64 {
        self.batches_committed
    }
}

impl<D: DestinationBuffer + core::fmt::Debug> core::fmt::Debug for SparseUploader<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SparseUploader")
            .field("destination", &self.destination)
            .field("config", &self.config)
            .field("current_frame", &self.current_frame)
            .field("batches_committed", &self.batches_committed)
            .finish()
    }
}

/// The recording phase of a [`SparseUploader`]
///
/// Dropping a batch without committing discards what was recorded.
///
/// A batch mutably borrows its uploader, so a second batch cannot begin
/// while one is recording:
///
/// ```compile_fail
/// use void_upload::{HostBuffer, SparseUploader};
///
/// let mut uploader = SparseUploader::new(HostBuffer::new(4, 4));
/// let first = uploader.begin(16, 4).unwrap();
/// let second = uploader.begin(16, 4).unwrap();
/// first.commit().unwrap();
/// ```
///
/// Writers borrow the batch, so it cannot be committed while a writer is
/// still in use:
///
/// ```compile_fail
/// use void_upload::{HostBuffer, SparseUploader};
///
/// let mut uploader = SparseUploader::new(HostBuffer::new(4, 4));
/// let batch = uploader.begin(16, 4).unwrap();
/// let writer = batch.writer();
/// batch.commit().unwrap();
/// writer.add_upload(&1u32, 0);
/// ```
pub struct UploadBatch<'u, D: DestinationBuffer> {
    uploader: &'u mut SparseUploader<D>,
    frame: StagingFrame,
    state: RecordingState,
    committed: bool,
    finished: bool,
}

impl<'u, D: DestinationBuffer> UploadBatch<'u, D> {
    /// Handle for producers; copy it freely across threads
    #[inline]
    pub fn writer(&self) -> ThreadedSparseUploader<'_> {
        ThreadedSparseUploader::new(&self.state)
    }

    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.state.max_bytes()
    }

    #[inline]
    pub fn max_operations(&self) -> usize {
        self.state.max_operations()
    }

    #[inline]
    pub fn operations_recorded(&self) -> usize {
        self.state.operations_recorded()
    }

    #[inline]
    pub fn bytes_staged(&self) -> usize {
        self.state.bytes_written()
    }

    /// Flush the recorded operations into the destination
    ///
    /// Every copy is validated before the first one is issued; on error the
    /// destination is left untouched and the batch is discarded.
    pub fn commit(mut self) -> Result<CommitStats, UploadError> {
        self.finished = true;

        let written = self.state.bytes_written();
        let recorded = self.state.operations_recorded();

        let commands = plan_copies(
            &self.frame.operations[..recorded],
            self.uploader.config.coalesce_copies,
        );
        validate(&commands, written, self.uploader.destination.size_in_bytes())?;

        let scratch = &self.frame.data[..written];
        let mut written_bytes = 0;
        for command in &commands {
            self.uploader.destination.copy(scratch, command);
            written_bytes += command.destination_len();
        }

        self.committed = true;

        let stats = CommitStats {
            operations: recorded,
            copies: commands.len(),
            staged_bytes: written,
            written_bytes,
        };
        debug!(
            "Committed upload batch: {} operations as {} copies, {:.3} MiB staged",
            stats.operations,
            stats.copies,
            stats.staged_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(stats)
    }
}

impl<D: DestinationBuffer> Drop for UploadBatch<'_, D> {
    fn drop(&mut self) {
        if !self.finished {
            let pending = self.state.operations_recorded();
            if pending > 0 && !std::thread::panicking() {
                warn!("Upload batch dropped with {} uncommitted operations", pending);
            }
        }

        let uploader = &mut *self.uploader;
        let slot = uploader.current_frame;
        uploader.frames[slot] = std::mem::take(&mut self.frame);

        if self.committed {
            uploader.current_frame = (slot + 1) % uploader.frames.len();
            uploader.batches_committed += 1;
        }
    }
}

impl<D: DestinationBuffer> core::fmt::Debug for UploadBatch<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UploadBatch")
            .field("frame", &self.uploader.current_frame)
            .field("bytes_staged", &self.bytes_staged())
            .field("max_bytes", &self.max_bytes())
            .field("operations_recorded", &self.operations_recorded())
            .field("max_operations", &self.max_operations())
            .finish()
    }
}
