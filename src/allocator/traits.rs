//! Allocator contracts
//!
//! Two seams are defined here:
//! - [`BlockAllocator`] — the raw block source a pool grows from. The pool
//!   asks it for whole backing blocks, never for individual chunks.
//! - [`TypedAllocator`] — the typed contract all allocator facades share:
//!   `allocate(n)` returns storage for `n` values, `deallocate` returns it.
//!
//! [`MemoryUsage`] is an optional reporting capability for allocators that
//! can account for their memory.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocResult;

/// Source of raw memory blocks for a pool.
///
/// # Safety
///
/// Implementors must ensure that:
/// - a successful `allocate` returns memory valid for reads and writes of
///   `layout.size()` bytes, aligned to `layout.align()`,
/// - memory stays valid until passed back to `deallocate`,
/// - `deallocate` accepts exactly the pointer/layout pairs produced by
///   `allocate` on the same instance.
pub unsafe trait BlockAllocator {
    /// Allocates a block described by `layout`.
    ///
    /// # Safety
    /// `layout` must have non-zero size and a power-of-two alignment the
    /// implementation supports.
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>>;

    /// Deallocates a block previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `layout`
    /// - `ptr` must not be used after this call
    /// - double-free is undefined behavior
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

// SAFETY: delegation preserves the callee's contract.
unsafe impl<A: BlockAllocator + ?Sized> BlockAllocator for &A {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        unsafe { (**self).allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// Typed allocation contract shared by the allocator facades.
///
/// `allocate(n)` yields storage for `n` values of `T`; `allocate(0)` yields
/// a dangling, well-aligned pointer without touching the underlying pool.
///
/// # Safety
///
/// Implementors must return pointers that are valid for `n` values of `T`,
/// aligned to `align_of::<T>()`, and that stay valid until the matching
/// `deallocate(ptr, n)` with the same `n`.
pub unsafe trait TypedAllocator<T> {
    /// Allocates storage for `n` values.
    ///
    /// # Errors
    /// Returns an error when the underlying pool cannot obtain memory.
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>>;

    /// Returns storage previously obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    /// - `ptr` must come from `allocate(n)` on an equal allocator with the
    ///   same `n`
    /// - `ptr` must not be used after this call
    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize);
}

/// Memory usage reporting
///
/// Allocators with a bounded backing store can report how much of it is in
/// use. Quantities are in bytes.
pub trait MemoryUsage {
    /// Currently allocated memory.
    fn used_memory(&self) -> usize;

    /// Memory still available without growing, or `None` if unbounded.
    fn available_memory(&self) -> Option<usize>;

    /// Total capacity, or `None` if unbounded.
    fn total_memory(&self) -> Option<usize> {
        match (self.used_memory(), self.available_memory()) {
            (used, Some(available)) => Some(used + available),
            _ => None,
        }
    }
}
