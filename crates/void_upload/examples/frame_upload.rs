//! Per-frame instance upload demonstration
//!
//! Sub-allocates an instance buffer with the heap allocator, then streams
//! transforms and their inverses into it from several producer threads
//! each frame while instances come and go.
//!
//! Run with `RUST_LOG=debug` to see commit summaries and frame growth.

use glam::{Mat4, Quat, Vec3};
use void_heap::{HeapAllocator, HeapBlock};
use void_upload::{HostBuffer, SparseUploader, SparseUploaderConfig};

const BUFFER_SIZE: u64 = 4 * 1024 * 1024;
const MATRIX_SIZE: u64 = 64;
const FRAMES: u32 = 12;
const PRODUCERS: usize = 4;

/// A group of instances sharing one heap block
struct InstanceGroup {
    block: HeapBlock,
    count: usize,
    phase: f32,
}

impl InstanceGroup {
    /// Forward matrices fill the first half of the block, inverses the second
    fn inverse_offset(&self) -> u64 {
        self.block.begin() + self.count as u64 * MATRIX_SIZE
    }

    fn transforms(&self, time: f32) -> Vec<Mat4> {
        (0..self.count)
            .map(|i| {
                let angle = time + self.phase + i as f32 * 0.05;
                Mat4::from_scale_rotation_translation(
                    Vec3::splat(1.0 + 0.1 * (i % 4) as f32),
                    Quat::from_rotation_y(angle),
                    Vec3::new(i as f32, self.phase, -angle),
                )
            })
            .collect()
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Frame Upload Demo");
    println!("=================\n");

    let mut heap = match HeapAllocator::with_alignment(BUFFER_SIZE, MATRIX_SIZE as u32) {
        Ok(heap) => heap,
        Err(e) => {
            log::error!("Failed to create instance heap: {}", e);
            return;
        }
    };

    let config = SparseUploaderConfig {
        frames_in_flight: 2,
        ..Default::default()
    };
    let mut uploader = match SparseUploader::with_config(
        HostBuffer::new((BUFFER_SIZE / MATRIX_SIZE) as usize, MATRIX_SIZE as usize),
        config,
    ) {
        Ok(uploader) => uploader,
        Err(e) => {
            log::error!("Failed to create uploader: {}", e);
            return;
        }
    };

    let mut groups: Vec<InstanceGroup> = Vec::new();

    for frame in 0..FRAMES {
        let time = frame as f32 / 60.0;

        // Retire the oldest group every third frame
        if frame % 3 == 2 && !groups.is_empty() {
            let retired = groups.remove(0);
            heap.release(retired.block);
        }

        let count = 64 + (frame as usize * 37) % 200;
        let block = heap.allocate(2 * count as u64 * MATRIX_SIZE);
        if block.is_empty() {
            log::warn!("Frame {}: no room for {} instances", frame, count);
        } else {
            groups.push(InstanceGroup {
                block,
                count,
                phase: frame as f32,
            });
        }

        let instances: usize = groups.iter().map(|group| group.count).sum();
        let batch = match uploader.begin(instances * 2 * MATRIX_SIZE as usize, groups.len() * 2) {
            Ok(batch) => batch,
            Err(e) => {
                log::error!("Frame {}: {}", frame, e);
                continue;
            }
        };

        let writer = batch.writer();
        let groups = &groups;
        let produced = crossbeam_utils::thread::scope(|s| {
            for producer in 0..PRODUCERS {
                s.spawn(move |_| {
                    for group in groups.iter().skip(producer).step_by(PRODUCERS) {
                        writer.add_matrix_upload(
                            &group.transforms(time),
                            group.block.begin(),
                            Some(group.inverse_offset()),
                        );
                    }
                });
            }
        });
        if produced.is_err() {
            log::error!("Frame {}: producer thread panicked", frame);
            continue;
        }

        match batch.commit() {
            Ok(stats) => log::info!(
                "Frame {:>2}: {} groups, {} instances, {} copies, {} bytes written, heap {}/{}",
                frame,
                groups.len(),
                instances,
                stats.copies,
                stats.written_bytes,
                heap.used_space(),
                heap.capacity()
            ),
            Err(e) => log::error!("Frame {}: commit failed: {}", frame, e),
        }
    }

    // Verify the newest group against a fresh computation
    if let Some(group) = groups.last() {
        let time = (FRAMES - 1) as f32 / 60.0;
        let first = (group.block.begin() / MATRIX_SIZE) as usize;
        let inverse = (group.inverse_offset() / MATRIX_SIZE) as usize;
        let expected = group.transforms(time)[0];

        let forward: Mat4 = uploader.destination().read(first);
        let backward: Mat4 = uploader.destination().read(inverse);
        println!(
            "\nNewest group: forward matches = {}, inverse matches = {}",
            forward.abs_diff_eq(expected, 1e-5),
            (forward * backward).abs_diff_eq(Mat4::IDENTITY, 1e-4)
        );
    }

    let stats = heap.stats();
    println!(
        "Heap: {} used, {} free in {} blocks (largest {})",
        stats.used, stats.free, stats.free_blocks, stats.largest_free_block
    );
    println!("Batches committed: {}", uploader.batches_committed());
}
