//! Lock-free writer handle shared by upload producers
//!
//! Every call reserves its scratch bytes and its operation slot with one
//! `fetch_add` each, then writes into the reserved ranges without further
//! synchronization. Reserved ranges never overlap, so producers on any
//! number of threads can share one handle.

use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use bytemuck::Pod;
use crossbeam_utils::CachePadded;
use glam::Mat4;

use crate::UploadOperation;

const MATRIX_SIZE: usize = core::mem::size_of::<Mat4>();

/// Cursors and storage of one recording phase
pub(crate) struct RecordingState {
    data: *mut u8,
    operations: *mut UploadOperation,
    max_bytes: usize,
    max_operations: usize,
    data_cursor: CachePadded<AtomicUsize>,
    operation_cursor: CachePadded<AtomicUsize>,
}

// Safety: writes through the raw pointers only target ranges handed out by
// the atomic cursors, and every range is handed out exactly once.
unsafe impl Send for RecordingState {}
unsafe impl Sync for RecordingState {}

impl RecordingState {
    /// # Safety
    /// `data` must be valid for writes of `max_bytes` bytes and `operations`
    /// for writes of `max_operations` elements for as long as the state is
    /// used, and nothing else may access that storage in the meantime.
    pub(crate) unsafe fn new(
        data: *mut u8,
        max_bytes: usize,
        operations: *mut UploadOperation,
        max_operations: usize,
    ) -> Self {
        Self {
            data,
            operations,
            max_bytes,
            max_operations,
            data_cursor: CachePadded::new(AtomicUsize::new(0)),
            operation_cursor: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    pub(crate) fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    #[inline]
    pub(crate) fn max_operations(&self) -> usize {
        self.max_operations
    }

    /// Scratch bytes handed out so far, clamped to the declared maximum
    #[inline]
    pub(crate) fn bytes_written(&self) -> usize {
        self.data_cursor.load(Ordering::Acquire).min(self.max_bytes)
    }

    /// Operation slots handed out so far, clamped to the declared maximum
    #[inline]
    pub(crate) fn operations_recorded(&self) -> usize {
        self.operation_cursor.load(Ordering::Acquire).min(self.max_operations)
    }

    /// Reserve `size` scratch bytes, returning their offset
    ///
    /// Ordering is relaxed: the commit barrier (joining producers) is what
    /// publishes the written bytes.
    fn reserve_bytes(&self, size: usize) -> usize {
        assert!(
            size <= self.max_bytes,
            "upload of {} bytes exceeds the {} scratch bytes declared at begin",
            size,
            self.max_bytes
        );

        let offset = self.data_cursor.fetch_add(size, Ordering::Relaxed);
        let fits = offset
            .checked_add(size)
            .is_some_and(|end| end <= self.max_bytes);
        assert!(
            fits,
            "upload batch scratch exhausted: {} bytes at offset {} exceeds {} declared at begin",
            size,
            offset,
            self.max_bytes
        );

        offset
    }

    /// Reserve `count` consecutive operation slots, returning the first index
    fn reserve_operations(&self, count: usize) -> usize {
        let index = self.operation_cursor.fetch_add(count, Ordering::Relaxed);
        let fits = index
            .checked_add(count)
            .is_some_and(|end| end <= self.max_operations);
        assert!(
            fits,
            "upload batch operations exhausted: {} declared at begin",
            self.max_operations
        );

        index
    }

    /// # Safety
    /// `offset..offset + bytes.len()` must have been reserved by the caller.
    #[inline]
    unsafe fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        ptr::copy_nonoverlapping(bytes.as_ptr(), self.data.add(offset), bytes.len());
    }

    /// # Safety
    /// `index` must have been reserved by the caller.
    #[inline]
    unsafe fn write_operation(&self, index: usize, operation: UploadOperation) {
        self.operations.add(index).write(operation);
    }
}

/// Copyable, thread-safe handle for recording uploads into a batch
///
/// Obtained from [`UploadBatch::writer`](crate::UploadBatch::writer). The
/// handle borrows the batch, so every copy must be gone (producers joined)
/// before the batch can be committed.
///
/// # Panics
/// Every `add_*` method panics if the batch runs out of the scratch bytes or
/// operation slots declared at [`begin`](crate::SparseUploader::begin).
#[derive(Clone, Copy)]
pub struct ThreadedSparseUploader<'a> {
    state: &'a RecordingState,
}

impl<'a> ThreadedSparseUploader<'a> {
    pub(crate) fn new(state: &'a RecordingState) -> Self {
        Self { state }
    }

    /// Scratch capacity of the batch in bytes
    pub fn max_bytes(&self) -> usize {
        self.state.max_bytes()
    }

    /// Operation capacity of the batch
    pub fn max_operations(&self) -> usize {
        self.state.max_operations()
    }

    /// Stage raw bytes for `destination_offset`
    ///
    /// With `repeat_count > 1` the bytes are staged once and written to
    /// `repeat_count` consecutive slots of `bytes.len()` each. A repeat
    /// count of zero is treated as one. Empty uploads are ignored.
    pub fn add_upload_bytes(&self, bytes: &[u8], destination_offset: u64, repeat_count: u32) {
        if bytes.is_empty() {
            return;
        }

        let staging_offset = self.state.reserve_bytes(bytes.len());
        let index = self.state.reserve_operations(1);

        // SAFETY: both ranges were reserved for this call alone.
        unsafe {
            self.state.write_bytes(staging_offset, bytes);
            self.state.write_operation(
                index,
                UploadOperation {
                    staging_offset: staging_offset as u64,
                    destination_offset,
                    size: bytes.len() as u64,
                    repeat_count: repeat_count.max(1),
                },
            );
        }
    }

    /// Stage one value for `destination_offset`
    pub fn add_upload<T: Pod>(&self, value: &T, destination_offset: u64) {
        self.add_upload_bytes(bytemuck::bytes_of(value), destination_offset, 1);
    }

    /// Stage a contiguous run of values starting at `destination_offset`
    pub fn add_upload_slice<T: Pod>(&self, values: &[T], destination_offset: u64) {
        self.add_upload_bytes(bytemuck::cast_slice(values), destination_offset, 1);
    }

    /// Stage one value and fill `repeat_count` consecutive slots with it
    pub fn add_splat<T: Pod>(&self, value: &T, destination_offset: u64, repeat_count: u32) {
        self.add_upload_bytes(bytemuck::bytes_of(value), destination_offset, repeat_count);
    }

    /// Stage matrices and, optionally, their inverses
    ///
    /// The matrices land at `destination_offset`. When
    /// `inverse_destination_offset` is given, the inverse of each matrix is
    /// computed here and lands there, recorded as a second operation. Both
    /// halves are reserved together.
    pub fn add_matrix_upload(
        &self,
        matrices: &[Mat4],
        destination_offset: u64,
        inverse_destination_offset: Option<u64>,
    ) {
        if matrices.is_empty() {
            return;
        }

        let forward_size = matrices.len() * MATRIX_SIZE;
        let operation_count = if inverse_destination_offset.is_some() { 2 } else { 1 };

        let staging_offset = self.state.reserve_bytes(forward_size * operation_count);
        let index = self.state.reserve_operations(operation_count);

        // SAFETY: `forward_size * operation_count` bytes and
        // `operation_count` slots were reserved for this call alone.
        unsafe {
            self.state.write_bytes(staging_offset, bytemuck::cast_slice(matrices));
            self.state.write_operation(
                index,
                UploadOperation {
                    staging_offset: staging_offset as u64,
                    destination_offset,
                    size: forward_size as u64,
                    repeat_count: 1,
                },
            );

            if let Some(inverse_offset) = inverse_destination_offset {
                let inverse_staging = staging_offset + forward_size;
                for (i, matrix) in matrices.iter().enumerate() {
                    let inverse = matrix.inverse();
                    self.state.write_bytes(
                        inverse_staging + i * MATRIX_SIZE,
                        bytemuck::bytes_of(&inverse),
                    );
                }
                self.state.write_operation(
                    index + 1,
                    UploadOperation {
                        staging_offset: inverse_staging as u64,
                        destination_offset: inverse_offset,
                        size: forward_size as u64,
                        repeat_count: 1,
                    },
                );
            }
        }
    }
}

impl core::fmt::Debug for ThreadedSparseUploader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadedSparseUploader")
            .field("bytes_written", &self.state.bytes_written())
            .field("max_bytes", &self.state.max_bytes())
            .field("operations_recorded", &self.state.operations_recorded())
            .field("max_operations", &self.state.max_operations())
            .finish()
    }
}
