//! Simple segregated storage
//!
//! The smallest, fastest layer of the pool: a free list of fixed-size chunks
//! threaded through the free memory itself. The first word of every free
//! chunk holds the address of the next free chunk; an in-use chunk is opaque
//! and carries no metadata at all.
//!
//! The storage is *empty* when its free list is empty, and *ordered* when
//! walking the free list yields strictly ascending addresses. A method is
//! order-preserving when an ordered free list stays ordered across the call.
//! Nearly every method has preconditions (alignment, chunk provenance, chunk
//! size); they are delegated to the caller and asserted in debug builds
//! where cheap to check.
//!
//! ## Invariants
//!
//! - Every free-list entry lies inside a region previously handed to
//!   `add_block`/`add_ordered_block` and no address appears twice.
//! - Chunk size is at least pointer-sized and pointer-aligned, so the
//!   next-pointer store through a chunk is always valid and aligned.

use core::ptr;

/// Free list of fixed-size chunks threaded through the chunks themselves.
pub struct SegregatedStorage {
    /// First free chunk, or null when the storage is empty.
    first: *mut u8,
}

impl SegregatedStorage {
    /// Creates an empty storage.
    #[inline]
    pub const fn new() -> Self {
        Self {
            first: ptr::null_mut(),
        }
    }

    /// Checks whether the free list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first.is_null()
    }

    #[inline]
    pub(crate) fn first(&self) -> *mut u8 {
        self.first
    }

    #[inline]
    pub(crate) fn set_first(&mut self, first: *mut u8) {
        self.first = first;
    }

    /// Reads the next-pointer stored in a free chunk.
    ///
    /// # Safety
    /// `chunk` must point to a live free chunk of this storage (or any
    /// pointer-aligned region at least one pointer wide).
    #[inline]
    pub(crate) unsafe fn next_of(chunk: *mut u8) -> *mut u8 {
        debug_assert!(!chunk.is_null());
        // SAFETY: a free chunk's first word is its next-pointer (caller's
        // contract); chunks are pointer-aligned.
        unsafe { chunk.cast::<*mut u8>().read() }
    }

    /// Writes the next-pointer of a free chunk.
    ///
    /// # Safety
    /// Same requirements as [`next_of`](Self::next_of).
    #[inline]
    pub(crate) unsafe fn set_next(chunk: *mut u8, next: *mut u8) {
        debug_assert!(!chunk.is_null());
        // SAFETY: see next_of; the chunk is free, so the pool owns its bytes.
        unsafe { chunk.cast::<*mut u8>().write(next) }
    }

    /// Threads a free list through `[block, block + size)` in place.
    ///
    /// Chunk `i` ends up pointing at chunk `i + 1` and the last chunk at
    /// `end`, so ascending address order is produced by construction. The
    /// number of chunks is `size / chunk_size` (the remainder is left
    /// untouched). Returns the head of the new list, which is `block`.
    ///
    /// # Safety
    /// - `block` must be valid for writes of `size` bytes and aligned for
    ///   pointer stores
    /// - `size >= chunk_size`, and `chunk_size` is a pointer-aligned,
    ///   pointer-sized-or-larger value
    pub unsafe fn segregate(
        block: *mut u8,
        size: usize,
        chunk_size: usize,
        end: *mut u8,
    ) -> *mut u8 {
        debug_assert!(!block.is_null());
        debug_assert!(chunk_size >= core::mem::size_of::<*mut u8>());
        debug_assert!(size >= chunk_size);

        // Last chunk sits at the largest multiple of chunk_size that still
        // leaves a whole chunk before `block + size`.
        let shift = ((size - chunk_size) / chunk_size) * chunk_size;
        // SAFETY: shift < size, so the chunk [block+shift, block+shift+chunk_size)
        // is inside the region (caller's contract).
        let mut old = unsafe { block.add(shift) };
        unsafe { Self::set_next(old, end) };

        // Single-chunk region: the head is also the tail.
        if old == block {
            return block;
        }

        // Build the links back to front.
        let mut iter = unsafe { old.sub(chunk_size) };
        while iter != block {
            unsafe { Self::set_next(iter, old) };
            old = iter;
            iter = unsafe { iter.sub(chunk_size) };
        }
        unsafe { Self::set_next(block, old) };
        block
    }

    /// Segregates `[block, block + size)` and prepends it to the free list.
    ///
    /// Not order-preserving.
    ///
    /// # Safety
    /// Same requirements as [`segregate`](Self::segregate); the region must
    /// not overlap anything already on the free list.
    pub unsafe fn add_block(&mut self, block: *mut u8, size: usize, chunk_size: usize) {
        self.first = unsafe { Self::segregate(block, size, chunk_size, self.first) };
    }

    /// Segregates `[block, block + size)` and splices it into the free list
    /// at its address position.
    ///
    /// Order-preserving.
    ///
    /// # Safety
    /// Same requirements as [`add_block`](Self::add_block).
    pub unsafe fn add_ordered_block(&mut self, block: *mut u8, size: usize, chunk_size: usize) {
        let loc = unsafe { self.find_prev(block) };
        if loc.is_null() {
            unsafe { self.add_block(block, size, chunk_size) };
        } else {
            let tail = unsafe { Self::next_of(loc) };
            let head = unsafe { Self::segregate(block, size, chunk_size, tail) };
            unsafe { Self::set_next(loc, head) };
        }
    }

    /// Pops and returns the head of the free list.
    ///
    /// # Safety
    /// The storage must not be empty; callers check [`is_empty`](Self::is_empty).
    #[inline]
    pub unsafe fn allocate(&mut self) -> *mut u8 {
        debug_assert!(!self.is_empty());
        let ret = self.first;
        self.first = unsafe { Self::next_of(ret) };
        ret
    }

    /// Prepends `chunk` to the free list.
    ///
    /// Not order-preserving.
    ///
    /// # Safety
    /// `chunk` must be a chunk previously obtained from this storage and not
    /// currently on the free list.
    #[inline]
    pub unsafe fn deallocate(&mut self, chunk: *mut u8) {
        unsafe { Self::set_next(chunk, self.first) };
        self.first = chunk;
    }

    /// Inserts `chunk` into the free list at its address position.
    ///
    /// Order-preserving.
    ///
    /// # Safety
    /// Same requirements as [`deallocate`](Self::deallocate).
    pub unsafe fn ordered_deallocate(&mut self, chunk: *mut u8) {
        let loc = unsafe { self.find_prev(chunk) };
        if loc.is_null() {
            unsafe { self.deallocate(chunk) };
        } else {
            unsafe {
                Self::set_next(chunk, Self::next_of(loc));
                Self::set_next(loc, chunk);
            }
        }
    }

    /// Finds `n` chunks that are contiguous in memory, unlinks them and
    /// returns the first; returns null when no such run exists or `n == 0`.
    ///
    /// A run is only found when it is also contiguous *in the free list*, so
    /// anything beyond trivial requests needs an ordered list. Order-
    /// preserving. O(free list).
    ///
    /// # Safety
    /// The free list must be well formed (storage invariants hold).
    pub unsafe fn allocate_n(&mut self, n: usize, chunk_size: usize) -> *mut u8 {
        if n == 0 {
            return ptr::null_mut();
        }

        // `link` is the cell holding the pointer to the first candidate: the
        // storage head to begin with, a chunk's next-cell after a failed try.
        let mut link: *mut *mut u8 = &mut self.first;
        loop {
            if unsafe { link.read() }.is_null() {
                return ptr::null_mut();
            }
            let last = unsafe { Self::try_allocate_n(&mut link, n, chunk_size) };
            if !last.is_null() {
                let ret = unsafe { link.read() };
                unsafe { link.write(Self::next_of(last)) };
                return ret;
            }
        }
    }

    /// Attempts to take a contiguous `n`-run starting at the chunk `*link`
    /// points to. On success returns the run's last chunk. On failure
    /// returns null and advances `link` to the last chunk considered, whose
    /// successor (if any) starts the next candidate run.
    unsafe fn try_allocate_n(link: &mut *mut *mut u8, n: usize, chunk_size: usize) -> *mut u8 {
        let mut iter = unsafe { (*link).read() };
        let mut remaining = n;
        while remaining > 1 {
            let next = unsafe { Self::next_of(iter) };
            if next != unsafe { iter.add(chunk_size) } {
                // End of list or a hole in the run.
                *link = iter.cast::<*mut u8>();
                return ptr::null_mut();
            }
            iter = next;
            remaining -= 1;
        }
        iter
    }

    /// Returns `n` contiguous chunks to the free list.
    ///
    /// Not order-preserving.
    ///
    /// # Safety
    /// `chunks` must be the start of a contiguous run of `n` chunks obtained
    /// from this storage, none of them currently free.
    pub unsafe fn deallocate_n(&mut self, chunks: *mut u8, n: usize, chunk_size: usize) {
        if n != 0 {
            unsafe { self.add_block(chunks, n * chunk_size, chunk_size) };
        }
    }

    /// Returns `n` contiguous chunks to the free list at their address
    /// position.
    ///
    /// Order-preserving.
    ///
    /// # Safety
    /// Same requirements as [`deallocate_n`](Self::deallocate_n).
    pub unsafe fn ordered_deallocate_n(&mut self, chunks: *mut u8, n: usize, chunk_size: usize) {
        if n != 0 {
            unsafe { self.add_ordered_block(chunks, n * chunk_size, chunk_size) };
        }
    }

    /// Finds the free chunk after which `ptr` belongs in address order, or
    /// null when `ptr` would become the new head.
    unsafe fn find_prev(&self, ptr: *mut u8) -> *mut u8 {
        if self.first.is_null() || self.first > ptr {
            return core::ptr::null_mut();
        }

        let mut iter = self.first;
        loop {
            let next = unsafe { Self::next_of(iter) };
            if next.is_null() || next > ptr {
                return iter;
            }
            iter = next;
        }
    }
}

impl Default for SegregatedStorage {
    fn default() -> Self {
        Self::new()
    }
}
