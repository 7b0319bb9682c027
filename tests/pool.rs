//! Integration tests for the pool core
//!
//! Exercises the growth policy, ordered array allocation, block reclamation
//! and the failure fallback through observing block allocators.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use segpool::allocator::{BlockAllocator, MemoryUsage, SystemAllocator};
use segpool::error::{AllocError, AllocResult};
use segpool::pool::{Pool, PoolConfig};

/// Records every backing request while delegating to the system allocator.
#[derive(Clone, Default)]
struct Recording {
    allocs: Arc<Mutex<Vec<usize>>>,
    frees: Arc<Mutex<Vec<usize>>>,
}

impl Recording {
    fn alloc_sizes(&self) -> Vec<usize> {
        self.allocs.lock().unwrap().clone()
    }

    fn free_sizes(&self) -> Vec<usize> {
        self.frees.lock().unwrap().clone()
    }
}

unsafe impl BlockAllocator for Recording {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        self.allocs.lock().unwrap().push(layout.size());
        unsafe { SystemAllocator::new().allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.frees.lock().unwrap().push(layout.size());
        unsafe { SystemAllocator::new().deallocate(ptr, layout) };
    }
}

/// Refuses every request, recording what was asked for.
#[derive(Clone, Default)]
struct Failing {
    requests: Arc<Mutex<Vec<usize>>>,
}

unsafe impl BlockAllocator for Failing {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        self.requests.lock().unwrap().push(layout.size());
        Err(AllocError::allocation_failed(layout.size(), layout.align()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        unreachable!("a failing allocator never hands out blocks");
    }
}

fn growth_config(next_size: usize) -> PoolConfig {
    PoolConfig {
        next_size,
        max_size: 0,
    }
}

#[test]
fn growth_doubles_block_sizes() {
    let backing = Recording::default();
    let mut pool = Pool::with_config_in(16, growth_config(4), backing.clone());

    let mut chunks = Vec::new();
    for _ in 0..10 {
        chunks.push(pool.allocate().expect("allocation failed"));
    }

    // First block: 4 chunks of 16 plus trailers; second: 8 chunks.
    assert_eq!(backing.alloc_sizes(), vec![80, 144]);
    assert_eq!(pool.next_size(), 16);

    // All ten chunks are distinct, pool-owned and aligned.
    for (i, chunk) in chunks.iter().enumerate() {
        assert!(pool.is_from(chunk.as_ptr()));
        assert_eq!(chunk.as_ptr() as usize % 8, 0);
        for other in &chunks[i + 1..] {
            assert_ne!(chunk.as_ptr(), other.as_ptr());
        }
    }

    for chunk in chunks {
        unsafe { pool.deallocate(chunk) };
    }

    drop(pool);
    // Purge on drop returns both blocks, newest block first.
    assert_eq!(backing.free_sizes(), vec![144, 80]);
}

#[test]
fn repeated_reuse_never_grows() {
    let backing = Recording::default();
    let mut pool = Pool::with_config_in(32, growth_config(4), backing.clone());

    for _ in 0..100 {
        let chunk = pool.allocate().expect("allocation failed");
        unsafe { pool.deallocate(chunk) };
    }

    assert_eq!(backing.alloc_sizes().len(), 1);
}

#[test]
fn ordered_array_allocation_takes_lowest_run() {
    let mut pool = Pool::with_config(8, growth_config(8));

    let run = pool.ordered_allocate_n(3).expect("run of three");
    assert_eq!(pool.free_chunks(), 5);

    // The five leftovers come out in ascending order, right after the run.
    let mut rest = Vec::new();
    for _ in 0..5 {
        rest.push(pool.ordered_allocate().expect("leftover chunk"));
    }
    assert_eq!(
        rest[0].as_ptr() as usize,
        run.as_ptr() as usize + 3 * 8,
        "first leftover follows the run"
    );
    assert!(rest.windows(2).all(|w| w[0].as_ptr() < w[1].as_ptr()));

    for chunk in rest {
        unsafe { pool.ordered_deallocate(chunk) };
    }
    unsafe { pool.ordered_deallocate_n(run, 3) };
    assert_eq!(pool.free_chunks(), 8);
}

#[test]
fn release_returns_idle_blocks_to_the_system() {
    let backing = Recording::default();
    let mut pool = Pool::with_config_in(8, growth_config(8), backing.clone());

    let run = pool.ordered_allocate_n(3).expect("run of three");
    unsafe { pool.ordered_deallocate_n(run, 3) };

    assert!(pool.release_memory());
    assert_eq!(backing.free_sizes(), vec![80]);
    assert!(!pool.is_from(run.as_ptr()));
    assert_eq!(pool.next_size(), 8);
    assert!(!pool.release_memory());
}

#[test]
fn release_skips_blocks_with_live_chunks() {
    let backing = Recording::default();
    let mut pool = Pool::with_config_in(8, growth_config(4), backing.clone());

    // Two blocks; the first keeps one live chunk.
    let live = pool.ordered_allocate().expect("chunk");
    let mut drained = Vec::new();
    while pool.free_chunks() > 0 {
        drained.push(pool.ordered_allocate().expect("chunk"));
    }
    let second_block = pool.ordered_allocate().expect("chunk from second block");
    assert_eq!(backing.alloc_sizes().len(), 2);

    for chunk in drained {
        unsafe { pool.ordered_deallocate(chunk) };
    }
    unsafe { pool.ordered_deallocate(second_block) };

    // Only the fully-free second block can go.
    assert!(pool.release_memory());
    assert_eq!(backing.free_sizes().len(), 1);
    assert!(pool.is_from(live.as_ptr()));

    unsafe { pool.ordered_deallocate(live) };
    assert!(pool.release_memory());
    assert_eq!(backing.free_sizes().len(), 2);
}

#[test]
fn failure_fallback_halves_once_then_gives_up() {
    let backing = Failing::default();
    let mut pool = Pool::with_config_in(
        16,
        PoolConfig {
            next_size: 16,
            max_size: 0,
        },
        backing.clone(),
    );

    assert!(pool.allocate().is_none());

    // 16 chunks of 16 plus trailers, then the halved retry, then nothing.
    assert_eq!(*backing.requests.lock().unwrap(), vec![272, 144]);
    assert_eq!(pool.next_size(), 8);
}

#[test]
fn small_requests_are_not_halved() {
    let backing = Failing::default();
    let mut pool = Pool::with_config_in(16, growth_config(4), backing.clone());

    assert!(pool.allocate().is_none());
    // next_size of 4 is already at the fallback floor: one request only.
    assert_eq!(backing.requests.lock().unwrap().len(), 1);
}

#[test]
fn array_failure_does_not_shrink_below_request() {
    let backing = Failing::default();
    let mut pool = Pool::with_config_in(
        16,
        PoolConfig {
            next_size: 16,
            max_size: 0,
        },
        backing.clone(),
    );

    assert!(pool.ordered_allocate_n(12).is_none());
    // Halving 16 would undercut the 12-chunk request, so the retry asks for
    // exactly 12 chunks.
    assert_eq!(*backing.requests.lock().unwrap(), vec![272, 208]);
}

#[test]
fn growth_respects_max_size() {
    let backing = Recording::default();
    let mut pool = Pool::with_config_in(
        16,
        PoolConfig {
            next_size: 4,
            max_size: 8,
        },
        backing.clone(),
    );

    let mut chunks = Vec::new();
    for _ in 0..30 {
        chunks.push(pool.allocate().expect("allocation failed"));
    }

    // 4 chunks, then clamped at 8 per block.
    assert_eq!(backing.alloc_sizes(), vec![80, 144, 144, 144, 144]);

    for chunk in chunks {
        unsafe { pool.deallocate(chunk) };
    }
}

#[test]
fn mixed_disciplines_fall_through_to_a_new_block() {
    let backing = Recording::default();
    let mut pool = Pool::with_config_in(16, growth_config(1), backing.clone());

    let single = pool.allocate().expect("unordered chunk");
    assert_eq!(pool.free_chunks(), 0);

    // No contiguous pair anywhere: the array request must grow the pool.
    let run = pool.ordered_allocate_n(2).expect("run of two");
    assert_eq!(backing.alloc_sizes().len(), 2);
    assert!(pool.is_from(single.as_ptr()));
    assert!(pool.is_from(run.as_ptr()));

    unsafe {
        pool.deallocate(single);
        pool.ordered_deallocate_n(run, 2);
    }
}

#[test]
fn purge_invalidates_outstanding_chunks() {
    let backing = Recording::default();
    let mut pool = Pool::with_config_in(16, growth_config(4), backing.clone());

    let chunk = pool.allocate().expect("chunk");
    assert!(pool.purge_memory());
    assert!(!pool.is_from(chunk.as_ptr()));
    assert_eq!(pool.free_chunks(), 0);
    assert_eq!(backing.free_sizes(), vec![80]);
    assert!(!pool.purge_memory());

    // The pool keeps working after a purge.
    let fresh = pool.allocate().expect("chunk after purge");
    unsafe { pool.deallocate(fresh) };
}

#[test]
fn memory_usage_tracks_the_free_list() {
    let mut pool = Pool::with_config(16, growth_config(4));
    assert_eq!(pool.total_memory(), Some(0));

    let chunk = pool.allocate().expect("chunk");
    assert_eq!(pool.total_memory(), Some(64));
    assert_eq!(pool.used_memory(), 16);
    assert_eq!(pool.available_memory(), Some(48));

    unsafe { pool.deallocate(chunk) };
    assert_eq!(pool.used_memory(), 0);
}

#[test]
fn tiny_chunk_sizes_are_lifted_to_the_minimum() {
    let mut pool = Pool::new(1);
    assert_eq!(pool.alloc_size() % 8, 0);
    assert!(pool.alloc_size() >= 8);

    let a = pool.allocate().expect("chunk");
    let b = pool.allocate().expect("chunk");
    assert!(
        (b.as_ptr() as usize).abs_diff(a.as_ptr() as usize) >= pool.alloc_size(),
        "chunks must not overlap"
    );
    unsafe {
        pool.deallocate(a);
        pool.deallocate(b);
    }
}
