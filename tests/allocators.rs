//! Integration tests for the typed allocator facades
//!
//! Covers the singleton and instance facades, tag partitioning of the
//! process-wide pools, the fast hybrid paths and the shared typed contract.

use std::ptr::NonNull;

use segpool::allocator::{
    FastPoolAllocator, PoolAllocator, ScopedFastPoolAllocator, ScopedPoolAllocator,
    SystemAllocator, TypedAllocator,
};
use segpool::pool::{Pool, PoolConfig, SingletonPool};
use segpool::sync::Unlocked;

/// Writes then reads back `n` values through any typed allocator.
fn round_trip<A: TypedAllocator<u32>>(alloc: &A, n: usize) {
    let ptr = alloc.allocate(n).expect("allocation failed");
    unsafe {
        for i in 0..n {
            ptr.as_ptr().add(i).write(i as u32);
        }
        for i in 0..n {
            assert_eq!(ptr.as_ptr().add(i).read(), i as u32);
        }
        alloc.deallocate(ptr, n);
    }
}

#[test]
fn every_facade_satisfies_the_typed_contract() {
    struct ContractTag;

    round_trip(&PoolAllocator::<u32, ContractTag>::new(), 12);
    round_trip(&FastPoolAllocator::<u32, ContractTag>::new(), 12);
    round_trip(&ScopedPoolAllocator::<u32>::new(), 12);
    round_trip(&ScopedFastPoolAllocator::<u32>::new(), 12);
}

#[test]
fn singleton_pools_are_partitioned_by_tag() {
    struct RedTag;
    struct BlueTag;

    let red = PoolAllocator::<u64, RedTag>::new();
    let blue = PoolAllocator::<u64, BlueTag>::new();

    let from_red = red.allocate(1).expect("red chunk");
    let from_blue = blue.allocate(1).expect("blue chunk");

    // The byte-level singletons with the same identity see the same pools.
    type RedPool = SingletonPool<RedTag, 8>;
    type BluePool = SingletonPool<BlueTag, 8>;
    assert!(RedPool::is_from(from_red.as_ptr().cast()));
    assert!(!RedPool::is_from(from_blue.as_ptr().cast()));
    assert!(BluePool::is_from(from_blue.as_ptr().cast()));
    assert!(!BluePool::is_from(from_red.as_ptr().cast()));

    unsafe {
        red.deallocate(from_red, 1);
        blue.deallocate(from_blue, 1);
    }
    assert!(RedPool::release_memory());
    assert!(BluePool::release_memory());
}

#[test]
fn fast_facade_reuses_single_chunks_lifo() {
    struct LifoTag;
    let alloc = FastPoolAllocator::<u64, LifoTag>::new();

    let first = alloc.allocate(1).expect("chunk");
    unsafe { alloc.deallocate(first, 1) };
    let second = alloc.allocate(1).expect("chunk");
    assert_eq!(first, second);

    unsafe { alloc.deallocate(second, 1) };
    SingletonPool::<LifoTag, 8>::purge_memory();
}

#[test]
fn fast_facade_serves_arrays_through_the_ordered_path() {
    struct ArrayTag;
    let alloc = FastPoolAllocator::<u16, ArrayTag>::new();

    // 10 u16s are 20 bytes: three 8-byte chunks.
    let run = alloc.allocate(10).expect("array");
    unsafe {
        for i in 0..10 {
            run.as_ptr().add(i).write(i as u16);
        }
        assert_eq!(run.as_ptr().add(9).read(), 9);
        alloc.deallocate(run, 10);
    }
    SingletonPool::<ArrayTag, 2>::purge_memory();
}

#[test]
fn handles_are_copies_of_the_same_pool() {
    struct CopyTag;
    let a = PoolAllocator::<u32, CopyTag>::new();
    let b = a;
    assert_eq!(a, b);

    let ptr = a.allocate(2).expect("chunk");
    // The copy frees what the original allocated.
    unsafe { b.deallocate(ptr, 2) };
    SingletonPool::<CopyTag, 4>::purge_memory();
}

#[test]
fn zero_count_never_touches_the_pool() {
    struct IdleTag;
    let alloc = PoolAllocator::<u32, IdleTag>::new();

    let ptr = alloc.allocate(0).expect("zero-count");
    assert_eq!(ptr, NonNull::dangling());
    unsafe { alloc.deallocate(ptr, 0) };

    // The pool was never grown, so there is nothing to release.
    assert!(!SingletonPool::<IdleTag, 4>::release_memory());
}

#[test]
fn scoped_clones_share_and_release_together() {
    let alloc = ScopedPoolAllocator::<u64>::with_config(PoolConfig {
        next_size: 4,
        max_size: 0,
    });
    let clone = alloc.clone();

    let a = alloc.allocate(2).expect("chunk");
    let b = clone.allocate(2).expect("chunk");
    assert!(alloc.is_from(b));
    assert!(clone.is_from(a));

    unsafe {
        clone.deallocate(a, 2);
        alloc.deallocate(b, 2);
    }
    assert!(clone.release_memory());
}

#[test]
fn scoped_pool_works_with_the_noop_lock() {
    let alloc = ScopedPoolAllocator::<u64, SystemAllocator, Unlocked<Pool<SystemAllocator>>>::
        with_config(PoolConfig::default());

    let ptr = alloc.allocate(3).expect("chunk");
    unsafe { alloc.deallocate(ptr, 3) };
    assert!(alloc.purge_memory());
}

#[test]
fn singleton_works_with_the_noop_lock() {
    struct SingleThreadTag;
    type P = SingletonPool<SingleThreadTag, 16, 4, 0, Unlocked<Pool<SystemAllocator>>>;

    let chunk = P::allocate().expect("chunk");
    assert!(P::is_from(chunk.as_ptr()));
    unsafe { P::deallocate(chunk) };
    assert!(P::purge_memory());
}

#[test]
fn concurrent_allocation_over_one_singleton() {
    use std::thread;

    struct SharedTag;
    type Shared = FastPoolAllocator<usize, SharedTag>;

    let mut handles = Vec::new();
    for worker in 0..4usize {
        handles.push(thread::spawn(move || {
            let alloc = Shared::new();
            let mut held = Vec::new();

            for round in 0..50 {
                let ptr = alloc.allocate(1).expect("chunk");
                unsafe { ptr.as_ptr().write(worker * 1000 + round) };
                held.push((ptr, worker * 1000 + round));
            }
            for (ptr, stamp) in held {
                unsafe {
                    assert_eq!(ptr.as_ptr().read(), stamp);
                    alloc.deallocate(ptr, 1);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    SingletonPool::<SharedTag, 8>::purge_memory();
}

#[test]
fn exhaustion_surfaces_as_an_allocation_error() {
    use std::alloc::Layout;
    use segpool::error::{AllocError, AllocResult};
    use segpool::allocator::BlockAllocator;

    #[derive(Default)]
    struct Refusing;

    unsafe impl BlockAllocator for Refusing {
        unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
            Err(AllocError::allocation_failed(layout.size(), layout.align()))
        }

        unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
    }

    let alloc = ScopedPoolAllocator::<[u64; 2], Refusing>::with_config(PoolConfig::default());
    let err = alloc.allocate(1).unwrap_err();
    assert!(err.is_out_of_memory());
}
