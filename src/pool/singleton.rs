//! Process-wide singleton pools
//!
//! Tag-partitioned global pools: for each distinct combination of tag type,
//! requested chunk size, growth parameters and lock flavor there is exactly
//! one process-wide [`Pool`], created lazily on first use and intentionally
//! never destroyed, so chunks it produced stay valid through teardown of
//! late-running callers. Tests can reclaim memory deterministically through
//! [`SingletonPool::purge_memory`].
//!
//! Pools live in a global registry; entries are leaked lock-wrapped pools,
//! inserted exactly once under the registry shard lock and published safely
//! to all threads.

use core::any::{Any, TypeId};
use core::marker::PhantomData;
use core::ptr::NonNull;
use std::sync::OnceLock;

use dashmap::DashMap;

use super::{Pool, PoolConfig};
use crate::allocator::SystemAllocator;
use crate::sync::{Locked, PoolLock};

/// Identity of one process-wide pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    tag: TypeId,
    requested_size: usize,
    next_size: usize,
    max_size: usize,
    lock: TypeId,
}

type Entry = &'static (dyn Any + Send + Sync);

static POOLS: OnceLock<DashMap<PoolKey, Entry>> = OnceLock::new();

/// Returns the process-wide pool for the given identity, creating it on
/// first use.
pub(crate) fn pool_handle<L>(
    tag: TypeId,
    requested_size: usize,
    next_size: usize,
    max_size: usize,
) -> &'static L
where
    L: PoolLock<Pool<SystemAllocator>> + Any + Send + Sync,
{
    let key = PoolKey {
        tag,
        requested_size,
        next_size,
        max_size,
        lock: TypeId::of::<L>(),
    };
    let registry = POOLS.get_or_init(DashMap::new);

    // Fast path: the pool already exists.
    if let Some(entry) = registry.get(&key) {
        return downcast::<L>(*entry);
    }

    // Slow path: initialize exactly once under the shard lock. Pools are
    // created empty, so no allocation happens while the shard is held.
    let entry = *registry.entry(key).or_insert_with(|| {
        let pool = Pool::with_config(
            requested_size,
            PoolConfig {
                next_size,
                max_size,
            },
        );
        let leaked: &'static L = Box::leak(Box::new(L::new(pool)));
        let erased: Entry = leaked;
        erased
    });
    downcast::<L>(entry)
}

fn downcast<L: Any>(entry: Entry) -> &'static L {
    // The key carries the lock's TypeId, so the entry type always matches.
    entry
        .downcast_ref::<L>()
        .expect("pool registry entry matches its keyed lock type")
}

/// Static access to a process-wide pool.
///
/// `Tag` partitions pools: two distinct tag types name two distinct pools
/// even when every other parameter agrees. `REQUESTED_SIZE` is the chunk
/// size in bytes and must be positive; `NEXT_SIZE`/`MAX_SIZE` seed the
/// pool's growth policy; `L` selects the lock flavor bracketing every
/// operation.
///
/// There is nothing to construct — all operations are associated functions:
///
/// ```
/// use segpool::pool::SingletonPool;
///
/// struct MessageTag;
/// type MessagePool = SingletonPool<MessageTag, 64>;
///
/// let chunk = MessagePool::allocate().expect("out of memory");
/// unsafe { MessagePool::deallocate(chunk) };
/// ```
pub struct SingletonPool<
    Tag,
    const REQUESTED_SIZE: usize,
    const NEXT_SIZE: usize = 32,
    const MAX_SIZE: usize = 0,
    L = Locked<Pool<SystemAllocator>>,
> {
    _marker: PhantomData<fn() -> (Tag, L)>,
}

impl<Tag, const REQUESTED_SIZE: usize, const NEXT_SIZE: usize, const MAX_SIZE: usize, L>
    SingletonPool<Tag, REQUESTED_SIZE, NEXT_SIZE, MAX_SIZE, L>
where
    Tag: 'static,
    L: PoolLock<Pool<SystemAllocator>> + Any + Send + Sync,
{
    /// Runs `f` on the underlying pool under the lock, initializing the pool
    /// on first use.
    fn with_pool<R>(f: impl FnOnce(&mut Pool<SystemAllocator>) -> R) -> R {
        pool_handle::<L>(TypeId::of::<Tag>(), REQUESTED_SIZE, NEXT_SIZE, MAX_SIZE).with(f)
    }

    /// Allocates one chunk from the unordered free list.
    pub fn allocate() -> Option<NonNull<u8>> {
        Self::with_pool(|pool| pool.allocate())
    }

    /// Allocates one chunk, keeping the free list ordered.
    pub fn ordered_allocate() -> Option<NonNull<u8>> {
        Self::with_pool(|pool| pool.ordered_allocate())
    }

    /// Allocates `n` contiguous `REQUESTED_SIZE`-byte units; `n == 0`
    /// returns `None`.
    pub fn ordered_allocate_n(n: usize) -> Option<NonNull<u8>> {
        Self::with_pool(|pool| pool.ordered_allocate_n(n))
    }

    /// Returns one chunk to the unordered free list.
    ///
    /// # Safety
    /// `chunk` must come from this singleton's `allocate`/`ordered_allocate`
    /// and not already be free.
    pub unsafe fn deallocate(chunk: NonNull<u8>) {
        Self::with_pool(|pool| unsafe { pool.deallocate(chunk) })
    }

    /// Returns one chunk to the free list at its address position.
    ///
    /// # Safety
    /// Same requirements as [`deallocate`](Self::deallocate).
    pub unsafe fn ordered_deallocate(chunk: NonNull<u8>) {
        Self::with_pool(|pool| unsafe { pool.ordered_deallocate(chunk) })
    }

    /// Returns an `n`-unit run; `n == 0` is a no-op. Not order-preserving.
    ///
    /// # Safety
    /// `chunks` and `n` must match a prior `ordered_allocate_n(n)` call on
    /// this singleton.
    pub unsafe fn deallocate_n(chunks: NonNull<u8>, n: usize) {
        Self::with_pool(|pool| unsafe { pool.deallocate_n(chunks, n) })
    }

    /// Returns an `n`-unit run in address order; `n == 0` is a no-op.
    ///
    /// # Safety
    /// Same requirements as [`deallocate_n`](Self::deallocate_n).
    pub unsafe fn ordered_deallocate_n(chunks: NonNull<u8>, n: usize) {
        Self::with_pool(|pool| unsafe { pool.ordered_deallocate_n(chunks, n) })
    }

    /// Checks whether `chunk` belongs to this singleton's pool.
    pub fn is_from(chunk: *const u8) -> bool {
        Self::with_pool(|pool| pool.is_from(chunk))
    }

    /// Releases every fully-free block back to the system.
    pub fn release_memory() -> bool {
        Self::with_pool(|pool| pool.release_memory())
    }

    /// Unconditionally releases all blocks, invalidating outstanding chunks.
    /// Intended for tests that need deterministic reclamation.
    pub fn purge_memory() -> bool {
        Self::with_pool(|pool| pool.purge_memory())
    }
}
