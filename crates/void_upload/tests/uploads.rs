//! Integration tests for sparse uploads
//!
//! Covers the full begin/record/commit cycle against a host buffer:
//! - Single, bulk and splat uploads
//! - Producers on many threads sharing one writer
//! - Matrix uploads with and without inverses
//! - Capacity and bounds failures

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Vec3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use void_upload::prelude::*;
use void_upload::SparseUploaderConfig;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct ExampleStruct {
    some_data: i32,
}

const STRIDE: usize = std::mem::size_of::<ExampleStruct>();

fn example(some_data: i32) -> ExampleStruct {
    ExampleStruct { some_data }
}

fn counting_buffer(len: usize) -> HostBuffer {
    let data: Vec<ExampleStruct> = (0..len as i32).map(example).collect();
    HostBuffer::from_data(&data)
}

fn results(uploader: &SparseUploader<HostBuffer>) -> Vec<i32> {
    uploader
        .destination()
        .get_data::<ExampleStruct>()
        .iter()
        .map(|value| value.some_data)
        .collect()
}

#[test]
fn test_no_uploads() {
    let mut uploader = SparseUploader::new(HostBuffer::new(1, 4));

    let batch = uploader.begin(1024, 1).expect("Should begin batch");
    let stats = batch.commit().expect("Empty batch should commit");

    assert_eq!(stats.operations, 0);
    assert_eq!(stats.copies, 0);
    assert_eq!(uploader.destination().get_data::<f32>(), vec![0.0]);
}

#[test]
fn test_small_upload() {
    let mut uploader = SparseUploader::new(HostBuffer::new(64, STRIDE));

    let batch = uploader.begin(64 * STRIDE, 64).expect("Should begin batch");
    let writer = batch.writer();
    for i in 0..64 {
        writer.add_upload(&example(i), i as u64 * 4);
    }
    batch.commit().expect("Should commit");

    assert_eq!(results(&uploader), (0..64).collect::<Vec<_>>());
}

#[test]
fn test_basic_uploads() {
    let mut uploader = SparseUploader::new(counting_buffer(1024));

    let batch = uploader.begin(STRIDE, 1).expect("Should begin batch");
    batch.writer().add_upload(&example(7), 4);
    batch.commit().expect("Should commit");

    let data = results(&uploader);
    assert_eq!(data[0], 0);
    assert_eq!(data[1], 7);
    assert_eq!(data[2], 2);

    let batch = uploader.begin(STRIDE, 1).expect("Should begin batch");
    batch.writer().add_upload(&example(13), 8);
    batch.commit().expect("Should commit");

    let data = results(&uploader);
    assert_eq!(data[0], 0);
    assert_eq!(data[1], 7);
    assert_eq!(data[2], 13);
    assert_eq!(data[3], 3);
}

#[test]
fn test_big_uploads() {
    let mut uploader = SparseUploader::new(counting_buffer(4 * 1024));

    let new_data: Vec<ExampleStruct> = (0..312).map(|i| example(i + 3000)).collect();
    let new_data2: Vec<ExampleStruct> = (0..316).map(|i| example(i + 4000)).collect();

    let batch = uploader
        .begin(STRIDE * (new_data.len() + new_data2.len()), 2)
        .expect("Should begin batch");
    let writer = batch.writer();
    writer.add_upload_slice(&new_data, 512 * 4);
    writer.add_upload_slice(&new_data2, 1136 * 4);
    batch.commit().expect("Should commit");

    for (i, value) in results(&uploader).into_iter().enumerate() {
        let i = i as i32;
        let expected = match i {
            512..=823 => i - 512 + 3000,
            1136..=1451 => i - 1136 + 4000,
            _ => i,
        };
        assert_eq!(value, expected, "element {}", i);
    }
}

#[test]
fn test_splat_upload() {
    let mut uploader = SparseUploader::new(HostBuffer::new(64, STRIDE));

    let batch = uploader.begin(STRIDE, 1).expect("Should begin batch");
    batch.writer().add_splat(&example(1), 0, 64);
    let stats = batch.commit().expect("Should commit");

    assert_eq!(stats.staged_bytes, STRIDE);
    assert_eq!(stats.written_bytes, 64 * STRIDE as u64);
    assert!(results(&uploader).iter().all(|&value| value == 1));
}

#[test]
fn test_writer_is_shareable() {
    fn assert_shareable<T: Copy + Send + Sync>() {}
    assert_shareable::<ThreadedSparseUploader<'static>>();
}

#[test]
fn test_upload_from_threads() {
    const COUNT: usize = 4 * 1024;
    const THREADS: usize = 8;

    let mut uploader = SparseUploader::new(HostBuffer::new(COUNT, STRIDE));

    let batch = uploader.begin(COUNT * STRIDE, COUNT).expect("Should begin batch");
    let writer = batch.writer();
    crossbeam_utils::thread::scope(|s| {
        for thread in 0..THREADS {
            s.spawn(move |_| {
                for index in (thread..COUNT).step_by(THREADS) {
                    writer.add_upload(&example(index as i32), index as u64 * 4);
                }
            });
        }
    })
    .expect("Producer thread panicked");

    assert_eq!(batch.operations_recorded(), COUNT);
    batch.commit().expect("Should commit");

    assert_eq!(results(&uploader), (0..COUNT as i32).collect::<Vec<_>>());
}

#[test]
fn test_random_sparse_uploads() {
    const COUNT: usize = 2048;

    let mut rng = StdRng::seed_from_u64(7_531);
    let mut indices: Vec<usize> = (0..COUNT).collect();
    indices.shuffle(&mut rng);
    indices.truncate(COUNT / 3);

    let mut uploader = SparseUploader::new(counting_buffer(COUNT));
    let mut expected: Vec<i32> = (0..COUNT as i32).collect();

    let batch = uploader
        .begin(indices.len() * STRIDE, indices.len())
        .expect("Should begin batch");
    let writer = batch.writer();
    for &index in &indices {
        let value = -(index as i32);
        writer.add_upload(&example(value), (index * STRIDE) as u64);
        expected[index] = value;
    }
    batch.commit().expect("Should commit");

    assert_eq!(results(&uploader), expected);
}

fn transform(i: usize) -> Mat4 {
    let i = i as f32;
    let translation = Mat4::from_translation(Vec3::new(
        i * 0.2,
        -i * 0.4,
        (i * std::f32::consts::PI * 0.02).cos(),
    ));
    let rotation = Mat4::from_euler(
        EulerRot::XYZ,
        i * 0.1,
        std::f32::consts::PI * 0.5,
        -i * 0.3,
    );
    translation * rotation
}

#[test]
fn test_matrix_uploads() {
    const NUM_MATRICES: usize = 1025;

    let initial = vec![Mat4::IDENTITY; NUM_MATRICES];
    let mut uploader = SparseUploader::new(HostBuffer::from_data(&initial));

    let matrices: Vec<Mat4> = (0..NUM_MATRICES).map(transform).collect();

    let batch = uploader
        .begin(NUM_MATRICES * 64, 1)
        .expect("Should begin batch");
    batch.writer().add_matrix_upload(&matrices, 0, None);
    batch.commit().expect("Should commit");

    let result = uploader.destination().get_data::<Mat4>();
    for (i, matrix) in result.iter().enumerate() {
        assert!(
            matrix.abs_diff_eq(transform(i), 1e-5),
            "matrix {} differs: {:?}",
            i,
            matrix
        );
    }
}

#[test]
fn test_inverse_matrix_uploads() {
    const NUM_MATRICES: usize = 2;

    let mut uploader = SparseUploader::new(HostBuffer::new(NUM_MATRICES * 2, 64));
    let matrices: Vec<Mat4> = (0..NUM_MATRICES).map(transform).collect();

    let batch = uploader
        .begin(NUM_MATRICES * 64 * 2, 2)
        .expect("Should begin batch");
    batch
        .writer()
        .add_matrix_upload(&matrices, 0, Some(NUM_MATRICES as u64 * 64));
    let stats = batch.commit().expect("Should commit");
    assert_eq!(stats.operations, 2);

    let result = uploader.destination().get_data::<Mat4>();
    for i in 0..NUM_MATRICES {
        let matrix = transform(i);
        assert!(result[i].abs_diff_eq(matrix, 1e-5));
        assert!(result[NUM_MATRICES + i].abs_diff_eq(matrix.inverse(), 1e-5));
        assert!((result[i] * result[NUM_MATRICES + i]).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }
}

#[test]
#[should_panic(expected = "scratch exhausted")]
fn test_scratch_capacity_panics() {
    let mut uploader = SparseUploader::new(HostBuffer::new(4, STRIDE));
    let batch = uploader.begin(STRIDE, 4).expect("Should begin batch");
    let writer = batch.writer();
    writer.add_upload(&example(1), 0);
    writer.add_upload(&example(2), 4);
}

#[test]
#[should_panic(expected = "operations exhausted")]
fn test_operation_capacity_panics() {
    let mut uploader = SparseUploader::new(HostBuffer::new(4, STRIDE));
    let batch = uploader.begin(4 * STRIDE, 1).expect("Should begin batch");
    let writer = batch.writer();
    writer.add_upload(&example(1), 0);
    writer.add_upload(&example(2), 4);
}

#[test]
fn test_out_of_bounds_leaves_destination_untouched() {
    let mut uploader = SparseUploader::new(counting_buffer(16));

    let batch = uploader.begin(2 * STRIDE, 2).expect("Should begin batch");
    let writer = batch.writer();
    writer.add_upload(&example(-1), 0);
    writer.add_upload(&example(-2), 16 * 4);

    let error = batch.commit().expect_err("Write past the end should fail");
    assert!(matches!(error, UploadError::DestinationOutOfBounds { .. }));
    assert_eq!(results(&uploader), (0..16).collect::<Vec<_>>());
}

#[test]
fn test_contiguous_uploads_at_address_limit_are_rejected() {
    let mut uploader = SparseUploader::new(counting_buffer(4));

    let batch = uploader.begin(2 * STRIDE, 2).expect("Should begin batch");
    let writer = batch.writer();
    writer.add_upload(&example(-1), u64::MAX - 1);
    writer.add_upload(&example(-2), u64::MAX);

    let error = batch.commit().expect_err("Offsets past the address space should fail");
    assert!(matches!(error, UploadError::TransferTooLarge { .. }));
    assert_eq!(results(&uploader), vec![0, 1, 2, 3]);
}

#[test]
fn test_batches_accumulate_across_frames() {
    const COUNT: usize = 32;

    let mut uploader = SparseUploader::new(HostBuffer::new(COUNT, STRIDE));
    let frames = uploader.frames_in_flight();

    for round in 0..2 * frames + 1 {
        assert_eq!(uploader.current_frame(), round % frames);

        let batch = uploader.begin(STRIDE, 1).expect("Should begin batch");
        batch
            .writer()
            .add_upload(&example(round as i32 + 100), (round * STRIDE) as u64);
        batch.commit().expect("Should commit");
    }

    let data = results(&uploader);
    for round in 0..2 * frames + 1 {
        assert_eq!(data[round], round as i32 + 100);
    }
    assert!(data[2 * frames + 1..].iter().all(|&value| value == 0));
}

#[test]
fn test_uploader_over_borrowed_destination() {
    let mut buffer = HostBuffer::new(8, STRIDE);
    {
        let mut uploader = SparseUploader::new(&mut buffer);
        let batch = uploader.begin(STRIDE, 1).expect("Should begin batch");
        batch.writer().add_splat(&example(5), 4 * 4, 4);
        batch.commit().expect("Should commit");
    }

    let data: Vec<i32> = buffer
        .get_data::<ExampleStruct>()
        .iter()
        .map(|value| value.some_data)
        .collect();
    assert_eq!(data, vec![0, 0, 0, 0, 5, 5, 5, 5]);
}

#[test]
fn test_invalid_config_rejected() {
    let config = SparseUploaderConfig {
        frames_in_flight: 0,
        ..Default::default()
    };

    let result = SparseUploader::with_config(HostBuffer::new(1, 4), config);
    assert!(matches!(result, Err(UploadError::InvalidConfig(_))));
}
