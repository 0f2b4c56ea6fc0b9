//! Destination buffers receiving committed uploads
//!
//! The uploader only computes offsets and sizes. Whatever owns the real
//! storage (a device buffer, a mapped staging ring, plain memory) implements
//! [`DestinationBuffer`] and performs the copies.

use bytemuck::Pod;

use crate::{CopyCommand, UploadError};

/// Target of committed copy commands
pub trait DestinationBuffer {
    /// Total addressable size in bytes
    fn size_in_bytes(&self) -> u64;

    /// Copy `command.size` bytes from `scratch` at `command.source_offset`
    /// to `command.destination_offset`, `command.repeat_count` times back to
    /// back
    ///
    /// Commands are bounds-checked against `scratch` and
    /// [`size_in_bytes`](Self::size_in_bytes) before any of them is issued.
    fn copy(&mut self, scratch: &[u8], command: &CopyCommand);
}

impl<T: DestinationBuffer + ?Sized> DestinationBuffer for &mut T {
    fn size_in_bytes(&self) -> u64 {
        (**self).size_in_bytes()
    }

    fn copy(&mut self, scratch: &[u8], command: &CopyCommand) {
        (**self).copy(scratch, command)
    }
}

/// Host-memory destination buffer
///
/// A buffer of `element_count` elements of `stride` bytes each, with bulk
/// initialization and readback. Serves as the reference destination and as
/// a CPU mirror of device buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostBuffer {
    bytes: Vec<u8>,
    element_count: usize,
    stride: usize,
}

impl HostBuffer {
    /// Create a zeroed buffer
    pub fn new(element_count: usize, stride: usize) -> Self {
        Self {
            bytes: vec![0; element_count * stride],
            element_count,
            stride,
        }
    }

    /// Create a buffer holding `data`, one element per value
    pub fn from_data<T: Pod>(data: &[T]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data).to_vec(),
            element_count: data.len(),
            stride: core::mem::size_of::<T>(),
        }
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Raw contents
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrite the whole buffer
    pub fn set_data<T: Pod>(&mut self, data: &[T]) -> Result<(), UploadError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() != self.bytes.len() {
            return Err(UploadError::SizeMismatch {
                expected: self.bytes.len(),
                actual: bytes.len(),
            });
        }
        self.bytes.copy_from_slice(bytes);
        Ok(())
    }

    /// Read the whole buffer back as values of `T`
    ///
    /// # Panics
    /// If `T` is zero-sized.
    pub fn get_data<T: Pod>(&self) -> Vec<T> {
        let size = core::mem::size_of::<T>();
        assert!(size > 0, "cannot read back zero-sized values");
        self.bytes
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Read the element at `index` as a `T`
    ///
    /// # Panics
    /// If the value would extend past the end of the buffer.
    pub fn read<T: Pod>(&self, index: usize) -> T {
        let offset = index * self.stride;
        bytemuck::pod_read_unaligned(&self.bytes[offset..offset + core::mem::size_of::<T>()])
    }
}

impl DestinationBuffer for HostBuffer {
    fn size_in_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn copy(&mut self, scratch: &[u8], command: &CopyCommand) {
        let source = &scratch[command.source_range()];
        let mut offset = command.destination_offset as usize;

        for _ in 0..command.repeat_count.max(1) {
            self.bytes[offset..offset + source.len()].copy_from_slice(source);
            offset += source.len();
        }
    }
}
