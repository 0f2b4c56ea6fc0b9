//! Randomized stress tests for the heap allocator
//!
//! Drives thousands of interleaved allocations and releases across many
//! size classes and checks the accounting and disjointness guarantees.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use void_heap::{HeapAllocator, HeapBlock};

const HEAP_SIZE: u64 = 1_000_000;
const NUM_BLOCKS: usize = 1_000;
const MAX_ALLOC: u64 = 10_000;
const OPERATIONS_PER_ROUND: usize = 10_000;

fn live_total(blocks: &[HeapBlock]) -> u64 {
    blocks.iter().map(HeapBlock::len).sum()
}

#[test]
fn test_random_stress() {
    const NUM_ROUNDS: usize = 20;

    let mut rng = StdRng::seed_from_u64(293_875);
    let mut heap = HeapAllocator::new(HEAP_SIZE);
    let mut blocks = vec![HeapBlock::EMPTY; NUM_BLOCKS];

    let mut allocs = 0;
    let mut failed = 0;

    for _ in 0..NUM_ROUNDS {
        assert!(heap.is_empty());

        for _ in 0..OPERATIONS_PER_ROUND {
            let before = heap.free_space();
            let slot = rng.gen_range(0..NUM_BLOCKS);

            if blocks[slot].is_empty() {
                let size = rng.gen_range(1..MAX_ALLOC);
                blocks[slot] = heap.allocate(size);
                allocs += 1;

                if blocks[slot].is_empty() {
                    failed += 1;
                    assert_eq!(heap.free_space(), before);
                } else {
                    assert!(blocks[slot].len() >= size);
                    assert_eq!(heap.free_space(), before - blocks[slot].len());
                }
            } else {
                let released = std::mem::take(&mut blocks[slot]);
                heap.release(released);
                assert_eq!(heap.free_space(), before + released.len());
            }

            assert_eq!(heap.free_space() + live_total(&blocks), HEAP_SIZE);
        }

        for block in blocks.iter_mut() {
            if !block.is_empty() {
                heap.release(std::mem::take(block));
            }
        }

        assert!(heap.is_empty());
        assert_eq!(heap.stats().free_blocks, 1);
    }

    assert!(allocs > failed);
}

#[test]
fn test_allocations_dont_overlap() {
    let mut rng = StdRng::seed_from_u64(9_283_572);
    let mut heap = HeapAllocator::new(HEAP_SIZE);
    let mut blocks = vec![HeapBlock::EMPTY; NUM_BLOCKS];
    let mut live: BTreeMap<u64, HeapBlock> = BTreeMap::new();

    for _ in 0..OPERATIONS_PER_ROUND {
        let slot = rng.gen_range(0..NUM_BLOCKS);

        if blocks[slot].is_empty() {
            let block = heap.allocate(rng.gen_range(1..MAX_ALLOC));
            if block.is_empty() {
                continue;
            }

            assert!(block.end() <= HEAP_SIZE);
            if let Some((_, before)) = live.range(..=block.begin()).next_back() {
                assert!(!before.overlaps(&block), "{} overlaps live {}", block, before);
            }
            if let Some((_, after)) = live.range(block.begin()..).next() {
                assert!(!after.overlaps(&block), "{} overlaps live {}", block, after);
            }

            live.insert(block.begin(), block);
            blocks[slot] = block;
        } else {
            let block = std::mem::take(&mut blocks[slot]);
            assert_eq!(live.remove(&block.begin()), Some(block));
            heap.release(block);
        }
    }

    for block in live.into_values() {
        heap.release(block);
    }
    assert!(heap.is_empty());
}

#[test]
fn test_aligned_allocations_dont_overlap() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut heap = HeapAllocator::with_alignment(HEAP_SIZE, 4).unwrap();
    let mut live: Vec<HeapBlock> = Vec::new();

    for _ in 0..2_000 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let alignment = 1u32 << rng.gen_range(0..9);
            let block = heap.allocate_aligned(rng.gen_range(1..4_096), alignment);
            if block.is_empty() {
                continue;
            }

            assert_eq!(block.begin() % u64::from(alignment.max(4)), 0);
            assert_eq!(block.len() % 4, 0);
            assert!(live.iter().all(|other| !other.overlaps(&block)));
            live.push(block);
        } else {
            let index = rng.gen_range(0..live.len());
            heap.release(live.swap_remove(index));
        }

        assert_eq!(heap.free_space() + live_total(&live), HEAP_SIZE);
    }

    for block in live.drain(..) {
        heap.release(block);
    }
    assert!(heap.is_empty());
}

#[derive(Clone, Debug)]
enum Op {
    Allocate(u64),
    Release(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..512).prop_map(Op::Allocate),
        any::<usize>().prop_map(Op::Release),
    ]
}

proptest! {
    #[test]
    fn prop_accounting_and_coalescing(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let capacity = 4_096;
        let mut heap = HeapAllocator::new(capacity);
        let mut live: Vec<HeapBlock> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate(size) => {
                    let block = heap.allocate(size);
                    if !block.is_empty() {
                        prop_assert!(live.iter().all(|other| !other.overlaps(&block)));
                        live.push(block);
                    }
                }
                Op::Release(index) => {
                    if !live.is_empty() {
                        let block = live.swap_remove(index % live.len());
                        heap.release(block);
                    }
                }
            }

            prop_assert_eq!(heap.free_space() + live_total(&live), capacity);

            let mut free: Vec<_> = heap.free_blocks().collect();
            free.sort();
            for pair in free.windows(2) {
                prop_assert!(pair[0].end() < pair[1].begin());
            }
        }

        for block in live.drain(..) {
            heap.release(block);
        }
        prop_assert!(heap.is_empty());
        prop_assert_eq!(heap.allocate(capacity).len(), capacity);
    }
}
