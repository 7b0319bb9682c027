//! Pool core
//!
//! A [`Pool`] hands out fixed-size chunks carved from larger blocks it
//! obtains from a [`BlockAllocator`]. Free chunks live on a
//! [`SegregatedStorage`] free list; blocks are chained through intrusive
//! trailers ([`BlockPtr`]). Two disciplines coexist:
//!
//! - the *unordered* path (`allocate`/`deallocate`) runs in O(1) and keeps
//!   no ordering guarantee,
//! - the *ordered* path (`ordered_*`) keeps both the free list and the block
//!   list ascending by address, which is what makes contiguous multi-chunk
//!   allocation and [`release_memory`](Pool::release_memory) possible.
//!
//! Blocks grow geometrically: each successful acquisition doubles the chunk
//! count of the next one, optionally clamped by `max_size`. When the backing
//! allocator refuses a block, the pool halves the request once and retries
//! before reporting failure.

use core::alloc::Layout;
use core::cmp;
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use super::{BlockPtr, SegregatedStorage, MIN_ALIGN, MIN_ALLOC_SIZE};
use crate::allocator::{BlockAllocator, MemoryUsage, SystemAllocator};

/// Growth parameters for a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of chunks in the first block the pool acquires.
    pub next_size: usize,
    /// Cap on the chunk count of any one block; 0 means unbounded.
    pub max_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            next_size: 32,
            max_size: 0,
        }
    }
}

/// Fixed-size chunk pool over a raw block source.
///
/// Created empty; the first allocation acquires the first block. On drop,
/// every block goes back to the backing allocator, invalidating all
/// outstanding chunks.
///
/// A pool is mutated through `&mut self` and is [`Send`] but not [`Sync`];
/// the allocator facades wrap it in a [`PoolLock`](crate::sync::PoolLock)
/// for shared use.
pub struct Pool<A: BlockAllocator = SystemAllocator> {
    store: SegregatedStorage,
    list: BlockPtr,
    alloc: A,
    requested_size: usize,
    next_size: usize,
    start_size: usize,
    max_size: usize,
}

// SAFETY: the pool exclusively owns its blocks and free list; every raw
// pointer it holds points into memory it alone manages, so moving the pool
// to another thread moves sole ownership along with it.
unsafe impl<A: BlockAllocator + Send> Send for Pool<A> {}

impl Pool<SystemAllocator> {
    /// Creates an empty pool of `requested_size`-byte chunks backed by the
    /// system allocator.
    pub fn new(requested_size: usize) -> Self {
        Self::with_config(requested_size, PoolConfig::default())
    }

    /// Creates an empty pool with explicit growth parameters.
    pub fn with_config(requested_size: usize, config: PoolConfig) -> Self {
        Self::with_config_in(requested_size, config, SystemAllocator::new())
    }
}

impl<A: BlockAllocator> Pool<A> {
    /// Creates an empty pool growing through the given block source.
    pub fn with_config_in(requested_size: usize, config: PoolConfig, alloc: A) -> Self {
        debug_assert!(requested_size > 0);
        debug_assert!(config.next_size > 0);
        Self {
            store: SegregatedStorage::new(),
            list: BlockPtr::invalid(),
            alloc,
            requested_size,
            next_size: config.next_size,
            start_size: config.next_size,
            max_size: config.max_size,
        }
    }

    /// Requested (unrounded) chunk size in bytes.
    #[inline]
    pub fn requested_size(&self) -> usize {
        self.requested_size
    }

    /// Actual chunk size: the requested size lifted to the pool's minimum
    /// and rounded up to [`MIN_ALIGN`].
    #[inline]
    pub fn alloc_size(&self) -> usize {
        crate::utils::align_up(cmp::max(self.requested_size, MIN_ALLOC_SIZE), MIN_ALIGN)
    }

    /// Number of chunks the next acquired block will hold.
    #[inline]
    pub fn next_size(&self) -> usize {
        self.next_size
    }

    /// Sets the chunk count of the next block; also becomes the value
    /// restored by [`release_memory`](Self::release_memory) and
    /// [`purge_memory`](Self::purge_memory).
    pub fn set_next_size(&mut self, next_size: usize) {
        debug_assert!(next_size > 0);
        self.next_size = next_size;
        self.start_size = next_size;
    }

    /// Chunk count restored into `next_size` after a release or purge.
    #[inline]
    pub fn start_size(&self) -> usize {
        self.start_size
    }

    /// Per-block chunk-count cap; 0 means unbounded.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Sets the per-block chunk-count cap; 0 means unbounded.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Allocates one chunk from the unordered free list in O(1).
    ///
    /// Returns `None` when the backing allocator cannot provide a new block
    /// even after the growth fallback.
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        if !self.store.is_empty() {
            // SAFETY: the free list is non-empty.
            return Some(unsafe { NonNull::new_unchecked(self.store.allocate()) });
        }
        self.allocate_need_resize()
    }

    /// Allocates one chunk, keeping the free list ordered.
    pub fn ordered_allocate(&mut self) -> Option<NonNull<u8>> {
        if !self.store.is_empty() {
            // SAFETY: the free list is non-empty.
            return Some(unsafe { NonNull::new_unchecked(self.store.allocate()) });
        }
        self.ordered_allocate_need_resize()
    }

    /// Allocates `n * requested_size` contiguous bytes as a run of whole
    /// chunks; `n == 0` returns `None`.
    ///
    /// Requires the ordered discipline to find runs on the free list; falls
    /// through to a fresh block when no run exists. Leftover chunks of the
    /// fresh block join the free list in order.
    pub fn ordered_allocate_n(&mut self, n: usize) -> Option<NonNull<u8>> {
        let partition_size = self.alloc_size();
        let num_chunks = self.chunks_for(n)?;

        let ret = unsafe { self.store.allocate_n(num_chunks, partition_size) };
        if !ret.is_null() || n == 0 {
            return NonNull::new(ret);
        }

        // Not enough contiguous space in the current storage; grow.
        self.next_size = cmp::max(self.next_size, num_chunks);
        let mut pod_size = self.block_size(self.next_size, partition_size)?;
        let mut block = self.allocate_block(pod_size);
        if block.is_null() {
            if num_chunks < self.next_size {
                // Retry once with just enough chunks to do the job.
                self.next_size = cmp::max(self.next_size >> 1, num_chunks);
                pod_size = self.block_size(self.next_size, partition_size)?;
                #[cfg(feature = "logging")]
                tracing::debug!(chunks = self.next_size, "block acquisition fell back");
                block = self.allocate_block(pod_size);
            }
            if block.is_null() {
                return None;
            }
        }
        let node = BlockPtr::new(block, pod_size);
        #[cfg(feature = "logging")]
        tracing::trace!(bytes = pod_size, chunks = self.next_size, "acquired block");

        // Chunks beyond the requested run go back to the ordered free list.
        if self.next_size > num_chunks {
            unsafe {
                self.store.add_ordered_block(
                    node.begin().add(num_chunks * partition_size),
                    node.element_size() - num_chunks * partition_size,
                    partition_size,
                );
            }
        }

        self.bump_next_size(partition_size);
        self.insert_block_ordered(node);
        // SAFETY: node came from a successful block allocation.
        Some(unsafe { NonNull::new_unchecked(node.begin()) })
    }

    /// Grows by one block inserted at the head of the block list and returns
    /// a chunk from it.
    fn allocate_need_resize(&mut self) -> Option<NonNull<u8>> {
        let partition_size = self.alloc_size();
        let node = self.acquire_block(partition_size)?;

        unsafe {
            self.store
                .add_block(node.begin(), node.element_size(), partition_size);
            node.set_next(self.list);
        }
        self.list = node;

        // SAFETY: add_block just stocked the free list.
        Some(unsafe { NonNull::new_unchecked(self.store.allocate()) })
    }

    /// Grows by one block spliced into the block list in address order and
    /// returns a chunk from it.
    fn ordered_allocate_need_resize(&mut self) -> Option<NonNull<u8>> {
        let partition_size = self.alloc_size();
        let node = self.acquire_block(partition_size)?;

        unsafe {
            self.store
                .add_ordered_block(node.begin(), node.element_size(), partition_size);
        }
        self.insert_block_ordered(node);

        // SAFETY: add_ordered_block just stocked the free list.
        Some(unsafe { NonNull::new_unchecked(self.store.allocate()) })
    }

    /// Asks the backing allocator for a `next_size`-chunk block, halving the
    /// request exactly once when refused. Updates the growth sequence on
    /// success.
    fn acquire_block(&mut self, partition_size: usize) -> Option<BlockPtr> {
        let mut pod_size = self.block_size(self.next_size, partition_size)?;
        let mut block = self.allocate_block(pod_size);
        if block.is_null() {
            if self.next_size > 4 {
                self.next_size >>= 1;
                pod_size = self.block_size(self.next_size, partition_size)?;
                #[cfg(feature = "logging")]
                tracing::debug!(chunks = self.next_size, "block acquisition fell back");
                block = self.allocate_block(pod_size);
            }
            if block.is_null() {
                return None;
            }
        }
        #[cfg(feature = "logging")]
        tracing::trace!(bytes = pod_size, chunks = self.next_size, "acquired block");

        self.bump_next_size(partition_size);
        Some(BlockPtr::new(block, pod_size))
    }

    /// Total byte size of a block holding `chunks` chunks plus trailers.
    #[inline]
    fn block_size(&self, chunks: usize, partition_size: usize) -> Option<usize> {
        chunks
            .checked_mul(partition_size)?
            .checked_add(MIN_ALLOC_SIZE + mem::size_of::<usize>())
    }

    /// Converts a count of `requested_size` units into whole chunks.
    #[inline]
    fn chunks_for(&self, n: usize) -> Option<usize> {
        let total = n.checked_mul(self.requested_size)?;
        let partition_size = self.alloc_size();
        Some(total / partition_size + usize::from(total % partition_size != 0))
    }

    /// Advances the geometric growth sequence after a successful block
    /// acquisition.
    fn bump_next_size(&mut self, partition_size: usize) {
        if self.max_size == 0 {
            self.next_size <<= 1;
        } else {
            // Cap expressed in chunks; a degenerate cap still leaves room
            // for one chunk per block.
            let cap = cmp::max(self.max_size * self.requested_size / partition_size, 1);
            self.next_size = cmp::min(self.next_size << 1, cap);
        }
    }

    fn allocate_block(&mut self, pod_size: usize) -> *mut u8 {
        let Ok(layout) = Layout::from_size_align(pod_size, MIN_ALIGN) else {
            return ptr::null_mut();
        };
        // SAFETY: layout has non-zero size and power-of-two alignment.
        match unsafe { self.alloc.allocate(layout) } {
            Ok(block) => block.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    /// # Safety
    /// `node` must be a valid block of this pool, already unlinked from the
    /// block list, with none of its chunks on the free list.
    unsafe fn free_block(&mut self, node: BlockPtr) {
        // SAFETY: the block was allocated with exactly this layout.
        unsafe {
            let layout = Layout::from_size_align_unchecked(node.total_size(), MIN_ALIGN);
            self.alloc
                .deallocate(NonNull::new_unchecked(node.begin()), layout);
        }
    }

    /// Splices `node` into the block list, keeping ascending start-address
    /// order.
    fn insert_block_ordered(&mut self, node: BlockPtr) {
        if !self.list.is_valid() || self.list.begin() > node.begin() {
            unsafe { node.set_next(self.list) };
            self.list = node;
            return;
        }

        let mut prev = self.list;
        loop {
            let next = unsafe { prev.next() };
            if !next.is_valid() || next.begin() > node.begin() {
                break;
            }
            prev = next;
        }
        unsafe {
            node.set_next(prev.next());
            prev.set_next(node);
        }
    }

    // ------------------------------------------------------------------
    // Deallocation
    // ------------------------------------------------------------------

    /// Returns one chunk to the unordered free list in O(1).
    ///
    /// # Safety
    /// `chunk` must come from `allocate`/`ordered_allocate` on this pool and
    /// not already be free.
    pub unsafe fn deallocate(&mut self, chunk: NonNull<u8>) {
        debug_assert!(self.is_from(chunk.as_ptr()));
        unsafe { self.store.deallocate(chunk.as_ptr()) };
    }

    /// Returns one chunk to the free list at its address position.
    ///
    /// # Safety
    /// Same requirements as [`deallocate`](Self::deallocate).
    pub unsafe fn ordered_deallocate(&mut self, chunk: NonNull<u8>) {
        debug_assert!(self.is_from(chunk.as_ptr()));
        unsafe { self.store.ordered_deallocate(chunk.as_ptr()) };
    }

    /// Returns an `n`-unit run obtained from
    /// [`ordered_allocate_n`](Self::ordered_allocate_n); `n == 0` is a
    /// no-op. Not order-preserving.
    ///
    /// # Safety
    /// `chunks` and `n` must match a prior `ordered_allocate_n(n)` call.
    pub unsafe fn deallocate_n(&mut self, chunks: NonNull<u8>, n: usize) {
        debug_assert!(n == 0 || self.is_from(chunks.as_ptr()));
        let partition_size = self.alloc_size();
        if let Some(num_chunks) = self.chunks_for(n) {
            unsafe {
                self.store
                    .deallocate_n(chunks.as_ptr(), num_chunks, partition_size)
            };
        }
    }

    /// Returns an `n`-unit run to the free list at its address position;
    /// `n == 0` is a no-op. Order-preserving.
    ///
    /// # Safety
    /// Same requirements as [`deallocate_n`](Self::deallocate_n).
    pub unsafe fn ordered_deallocate_n(&mut self, chunks: NonNull<u8>, n: usize) {
        debug_assert!(n == 0 || self.is_from(chunks.as_ptr()));
        let partition_size = self.alloc_size();
        if let Some(num_chunks) = self.chunks_for(n) {
            unsafe {
                self.store
                    .ordered_deallocate_n(chunks.as_ptr(), num_chunks, partition_size)
            };
        }
    }

    // ------------------------------------------------------------------
    // Queries and reclamation
    // ------------------------------------------------------------------

    /// Checks whether `chunk` lies inside any block of this pool.
    ///
    /// O(blocks).
    pub fn is_from(&self, chunk: *const u8) -> bool {
        let mut iter = self.list;
        while iter.is_valid() {
            let begin = iter.begin().cast_const();
            // SAFETY: end of the chunk region of a valid block.
            let end = unsafe { begin.add(iter.element_size()) };
            if chunk >= begin && chunk < end {
                return true;
            }
            iter = unsafe { iter.next() };
        }
        false
    }

    /// Returns every block whose chunks are all free to the backing
    /// allocator. Meaningful only after pure `ordered_*` use, where both the
    /// free list and the block list are ascending. Resets the growth
    /// sequence to `start_size`.
    ///
    /// Returns true iff at least one block was released.
    pub fn release_memory(&mut self) -> bool {
        let mut released = false;
        let partition_size = self.alloc_size();

        // Lockstep walk: (prev, ptr) over the block list, and over the free
        // list `free_p` (first free chunk at or beyond ptr's start) with
        // `prev_free_p` (last free chunk before ptr).
        let mut ptr_block = self.list;
        let mut prev = BlockPtr::invalid();
        let mut free_p = self.store.first();
        let mut prev_free_p: *mut u8 = ptr::null_mut();

        while ptr_block.is_valid() {
            // No free chunks left: every remaining block is partly in use.
            if free_p.is_null() {
                break;
            }

            // Because both lists are ordered, a fully-free block shows up as
            // a contiguous run of its chunks at the current free position.
            let mut all_chunks_free = true;
            let saved_free = free_p;
            let mut i = ptr_block.begin();
            while i != ptr_block.end() {
                if i != free_p {
                    all_chunks_free = false;
                    // The scan may have run past this block; rewind.
                    free_p = saved_free;
                    break;
                }
                // SAFETY: i is a free chunk (it equals free_p).
                free_p = unsafe { SegregatedStorage::next_of(free_p) };
                i = unsafe { i.add(partition_size) };
            }

            let next = unsafe { ptr_block.next() };

            if all_chunks_free {
                // Excise the block from the block list...
                if prev.is_valid() {
                    unsafe { prev.set_next(next) };
                } else {
                    self.list = next;
                }
                // ...and its chunk run from the free list.
                if !prev_free_p.is_null() {
                    unsafe { SegregatedStorage::set_next(prev_free_p, free_p) };
                } else {
                    self.store.set_first(free_p);
                }
                unsafe { self.free_block(ptr_block) };
                released = true;
            } else {
                // Skip the block's remaining free chunks, tracking the last
                // one as the splice point for later excisions.
                let begin = ptr_block.begin();
                let end = ptr_block.end();
                if free_p >= begin && free_p < end {
                    loop {
                        prev_free_p = free_p;
                        // SAFETY: free_p is a live free chunk.
                        free_p = unsafe { SegregatedStorage::next_of(free_p) };
                        if free_p.is_null() || free_p >= end {
                            break;
                        }
                    }
                }
                prev = ptr_block;
            }

            ptr_block = next;
        }

        #[cfg(feature = "logging")]
        tracing::debug!(released, "release_memory swept the block list");

        self.next_size = self.start_size;
        released
    }

    /// Unconditionally returns every block to the backing allocator,
    /// invalidating all outstanding chunks, and resets the growth sequence.
    ///
    /// Returns true iff the pool held at least one block.
    pub fn purge_memory(&mut self) -> bool {
        let mut iter = self.list;
        if !iter.is_valid() {
            return false;
        }

        while iter.is_valid() {
            let next = unsafe { iter.next() };
            // SAFETY: purge drops the free list wholesale, so no chunk of
            // this block remains reachable.
            unsafe { self.free_block(iter) };
            iter = next;
        }

        #[cfg(feature = "logging")]
        tracing::debug!("purge_memory returned all blocks");

        self.list.invalidate();
        self.store.set_first(ptr::null_mut());
        self.next_size = self.start_size;
        true
    }

    /// Number of chunks currently on the free list. O(free list).
    pub fn free_chunks(&self) -> usize {
        let mut count = 0;
        let mut iter = self.store.first();
        while !iter.is_null() {
            count += 1;
            // SAFETY: walking the well-formed free list.
            iter = unsafe { SegregatedStorage::next_of(iter) };
        }
        count
    }

    /// Total chunk capacity across all blocks. O(blocks).
    pub fn capacity(&self) -> usize {
        let partition_size = self.alloc_size();
        let mut chunks = 0;
        let mut iter = self.list;
        while iter.is_valid() {
            chunks += iter.element_size() / partition_size;
            iter = unsafe { iter.next() };
        }
        chunks
    }
}

impl<A: BlockAllocator> MemoryUsage for Pool<A> {
    fn used_memory(&self) -> usize {
        (self.capacity() - self.free_chunks()) * self.alloc_size()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.free_chunks() * self.alloc_size())
    }

    fn total_memory(&self) -> Option<usize> {
        Some(self.capacity() * self.alloc_size())
    }
}

impl<A: BlockAllocator> fmt::Debug for Pool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("requested_size", &self.requested_size)
            .field("alloc_size", &self.alloc_size())
            .field("next_size", &self.next_size)
            .field("start_size", &self.start_size)
            .field("max_size", &self.max_size)
            .field("capacity", &self.capacity())
            .field("free_chunks", &self.free_chunks())
            .finish()
    }
}

impl<A: BlockAllocator> Drop for Pool<A> {
    fn drop(&mut self) {
        self.purge_memory();
    }
}
