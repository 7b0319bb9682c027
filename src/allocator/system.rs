//! Backing block allocators
//!
//! Two [`BlockAllocator`] implementations back the pools:
//! - [`SystemAllocator`] delegates to the platform allocator through
//!   `std::alloc::System` and honors arbitrary power-of-two alignments.
//! - [`MallocAllocator`] delegates to the C runtime's `malloc`/`free` and is
//!   limited to the alignment `malloc` guarantees.
//!
//! Both are stateless, thread-safe and free to construct.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

use super::traits::BlockAllocator;
use crate::error::{AllocError, AllocResult};

/// Wrapper for the system's default allocator.
///
/// Delegates all operations to `std::alloc::System`. Thread safety comes
/// from the underlying platform allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates a new `SystemAllocator`. Zero-cost; the type holds no state.
    #[inline]
    pub const fn new() -> Self {
        SystemAllocator
    }
}

// SAFETY: System (GlobalAlloc) returns valid, properly aligned memory or
// null; null is mapped to an error below. Deallocation is forwarded with the
// caller's layout per the GlobalAlloc contract.
unsafe impl BlockAllocator for SystemAllocator {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        debug_assert!(layout.size() > 0);

        // SAFETY: layout is non-zero sized (pool blocks always are) and
        // carries a valid power-of-two alignment by Layout's construction.
        let ptr = unsafe { System.alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| AllocError::allocation_failed(layout.size(), layout.align()))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: ptr was produced by System.alloc with this layout
        // (caller's contract).
        unsafe { System.dealloc(ptr.as_ptr(), layout) };
    }
}

/// Wrapper for the C runtime allocator.
///
/// A shallow wrapper around `malloc` and `free`. Alignment support is capped
/// at what `malloc` guarantees (`max_align_t`); requests above that are
/// rejected rather than served misaligned.
#[derive(Debug, Clone, Copy, Default)]
pub struct MallocAllocator;

impl MallocAllocator {
    /// Strongest alignment `malloc` results are guaranteed to have.
    pub const MAX_ALIGN: usize = core::mem::align_of::<libc::max_align_t>();

    /// Creates a new `MallocAllocator`.
    #[inline]
    pub const fn new() -> Self {
        MallocAllocator
    }
}

// SAFETY: malloc returns memory valid for the requested size, aligned to
// max_align_t, or null; stricter alignments are rejected up front. free
// accepts exactly the pointers malloc produced.
unsafe impl BlockAllocator for MallocAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        debug_assert!(layout.size() > 0);

        if layout.align() > Self::MAX_ALIGN {
            return Err(AllocError::invalid_alignment(layout.align()));
        }

        // SAFETY: size is non-zero; malloc has no other preconditions.
        let ptr = unsafe { libc::malloc(layout.size()) }.cast::<u8>();
        NonNull::new(ptr).ok_or_else(|| AllocError::allocation_failed(layout.size(), layout.align()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        // SAFETY: ptr came from malloc (caller's contract).
        unsafe { libc::free(ptr.as_ptr().cast()) };
    }
}
