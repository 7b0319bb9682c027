//! Singleton-backed typed allocator facades
//!
//! [`PoolAllocator`] and [`FastPoolAllocator`] are zero-sized handles to a
//! process-wide [`SingletonPool`](crate::pool::SingletonPool)-style pool,
//! located by tag type, element size, growth parameters and lock flavor.
//! Every instance of a given facade type names the same global pool, so all
//! instances compare equal and handles are free to copy.
//!
//! The underlying pool is never destroyed; memory obtained through these
//! facades stays valid through process teardown. Tests can reclaim it
//! explicitly through the singleton's `purge_memory`.
//!
//! `PoolAllocator` always takes the ordered pool paths, which keeps block
//! reclamation through `release_memory` possible. `FastPoolAllocator` is
//! the hybrid-path variant optimized for single objects: `n == 1` takes the
//! O(1) unordered path, larger requests fall back to the ordered path.

use core::any::{Any, TypeId};
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

use super::traits::TypedAllocator;
use super::SystemAllocator;
use crate::error::{AllocError, AllocResult};
use crate::pool::{pool_handle, Pool, MIN_ALIGN};
use crate::sync::{Locked, PoolLock};

/// Default tag partitioning the pools behind [`PoolAllocator`].
pub struct PoolAllocatorTag;

/// Default tag partitioning the pools behind [`FastPoolAllocator`].
pub struct FastPoolAllocatorTag;

/// Lifts `size_of::<T>()` units into an error when the pool cannot serve
/// the request.
pub(crate) fn exhausted<T>(n: usize) -> AllocError {
    AllocError::allocation_failed(n.saturating_mul(mem::size_of::<T>()), mem::align_of::<T>())
}

/// Chunks are only `MIN_ALIGN`-aligned; stricter element types cannot be
/// served from a pool.
pub(crate) fn check_element_alignment<T>() -> AllocResult<()> {
    if mem::align_of::<T>() > MIN_ALIGN {
        return Err(AllocError::invalid_alignment(mem::align_of::<T>()));
    }
    Ok(())
}

/// An element count whose byte size overflows `usize` can never be served.
pub(crate) fn check_request_size<T>(n: usize) -> AllocResult<()> {
    if n.checked_mul(mem::size_of::<T>()).is_none() {
        return Err(AllocError::size_overflow("element count overflows the byte size"));
    }
    Ok(())
}

macro_rules! facade_impls {
    ($name:ident) => {
        impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> Clone
            for $name<T, Tag, L, NEXT_SIZE, MAX_SIZE>
        {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> Copy
            for $name<T, Tag, L, NEXT_SIZE, MAX_SIZE>
        {
        }

        impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> Default
            for $name<T, Tag, L, NEXT_SIZE, MAX_SIZE>
        {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> fmt::Debug
            for $name<T, Tag, L, NEXT_SIZE, MAX_SIZE>
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "<{}>"),
                    core::any::type_name::<T>()
                )
            }
        }

        /// All instances name the same process-wide pool.
        impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> PartialEq
            for $name<T, Tag, L, NEXT_SIZE, MAX_SIZE>
        {
            fn eq(&self, _: &Self) -> bool {
                true
            }
        }

        impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> Eq
            for $name<T, Tag, L, NEXT_SIZE, MAX_SIZE>
        {
        }
    };
}

/// Typed allocator over a tag-partitioned process-wide pool; always uses
/// the ordered pool paths.
///
/// ```
/// use segpool::allocator::PoolAllocator;
///
/// let alloc = PoolAllocator::<u64>::new();
/// let ptr = alloc.allocate(4).expect("out of memory");
/// unsafe { alloc.deallocate(ptr, 4) };
/// ```
pub struct PoolAllocator<
    T,
    Tag = PoolAllocatorTag,
    L = Locked<Pool<SystemAllocator>>,
    const NEXT_SIZE: usize = 32,
    const MAX_SIZE: usize = 0,
> {
    _marker: PhantomData<fn() -> (T, Tag, L)>,
}

impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize>
    PoolAllocator<T, Tag, L, NEXT_SIZE, MAX_SIZE>
{
    /// Creates a handle. Zero-cost; the pool itself appears on first use.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize>
    PoolAllocator<T, Tag, L, NEXT_SIZE, MAX_SIZE>
where
    Tag: 'static,
    L: PoolLock<Pool<SystemAllocator>> + Any + Send + Sync,
{
    fn with_pool<R>(f: impl FnOnce(&mut Pool<SystemAllocator>) -> R) -> R {
        pool_handle::<L>(TypeId::of::<Tag>(), mem::size_of::<T>(), NEXT_SIZE, MAX_SIZE).with(f)
    }

    /// Allocates storage for `n` values of `T`.
    ///
    /// `n == 0` and zero-sized `T` yield a dangling pointer without touching
    /// the pool.
    pub fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        check_element_alignment::<T>()?;
        check_request_size::<T>(n)?;
        if n == 0 || mem::size_of::<T>() == 0 {
            return Ok(NonNull::dangling());
        }
        Self::with_pool(|pool| pool.ordered_allocate_n(n))
            .map(NonNull::cast)
            .ok_or_else(|| exhausted::<T>(n))
    }

    /// Returns storage for `n` values; `n == 0` is a no-op.
    ///
    /// # Safety
    /// `ptr` must come from [`allocate`](Self::allocate) on this facade type
    /// with the same `n` and must not be used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        if n == 0 || mem::size_of::<T>() == 0 {
            return;
        }
        Self::with_pool(|pool| unsafe { pool.ordered_deallocate_n(ptr.cast(), n) });
    }
}

facade_impls!(PoolAllocator);

// SAFETY: chunks come from the shared pool sized and aligned for T (element
// alignment is checked up front) and stay valid until deallocated — the
// backing pool is never destroyed.
unsafe impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> TypedAllocator<T>
    for PoolAllocator<T, Tag, L, NEXT_SIZE, MAX_SIZE>
where
    Tag: 'static,
    L: PoolLock<Pool<SystemAllocator>> + Any + Send + Sync,
{
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        PoolAllocator::allocate(self, n)
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        unsafe { PoolAllocator::deallocate(self, ptr, n) }
    }
}

/// Typed allocator over a tag-partitioned process-wide pool, optimized for
/// single objects.
///
/// Single-value requests take the unordered O(1) path; multi-value requests
/// take the ordered path. The trade-off against [`PoolAllocator`] is that a
/// pool fed through the unordered path loses the ordering `release_memory`
/// relies on.
pub struct FastPoolAllocator<
    T,
    Tag = FastPoolAllocatorTag,
    L = Locked<Pool<SystemAllocator>>,
    const NEXT_SIZE: usize = 32,
    const MAX_SIZE: usize = 0,
> {
    _marker: PhantomData<fn() -> (T, Tag, L)>,
}

impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize>
    FastPoolAllocator<T, Tag, L, NEXT_SIZE, MAX_SIZE>
{
    /// Creates a handle. Zero-cost; the pool itself appears on first use.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize>
    FastPoolAllocator<T, Tag, L, NEXT_SIZE, MAX_SIZE>
where
    Tag: 'static,
    L: PoolLock<Pool<SystemAllocator>> + Any + Send + Sync,
{
    fn with_pool<R>(f: impl FnOnce(&mut Pool<SystemAllocator>) -> R) -> R {
        pool_handle::<L>(TypeId::of::<Tag>(), mem::size_of::<T>(), NEXT_SIZE, MAX_SIZE).with(f)
    }

    /// Allocates storage for `n` values of `T`; `n == 1` runs in O(1).
    pub fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        check_element_alignment::<T>()?;
        check_request_size::<T>(n)?;
        if n == 0 || mem::size_of::<T>() == 0 {
            return Ok(NonNull::dangling());
        }
        let chunk = if n == 1 {
            Self::with_pool(|pool| pool.allocate())
        } else {
            Self::with_pool(|pool| pool.ordered_allocate_n(n))
        };
        chunk.map(NonNull::cast).ok_or_else(|| exhausted::<T>(n))
    }

    /// Returns storage for `n` values; `n == 0` is a no-op.
    ///
    /// # Safety
    /// `ptr` must come from [`allocate`](Self::allocate) on this facade type
    /// with the same `n` and must not be used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        if n == 0 || mem::size_of::<T>() == 0 {
            return;
        }
        if n == 1 {
            Self::with_pool(|pool| unsafe { pool.deallocate(ptr.cast()) });
        } else {
            Self::with_pool(|pool| unsafe { pool.deallocate_n(ptr.cast(), n) });
        }
    }
}

facade_impls!(FastPoolAllocator);

// SAFETY: see the PoolAllocator impl; the hybrid path choice is symmetric
// between allocate and deallocate for any given n.
unsafe impl<T, Tag, L, const NEXT_SIZE: usize, const MAX_SIZE: usize> TypedAllocator<T>
    for FastPoolAllocator<T, Tag, L, NEXT_SIZE, MAX_SIZE>
where
    Tag: 'static,
    L: PoolLock<Pool<SystemAllocator>> + Any + Send + Sync,
{
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        FastPoolAllocator::allocate(self, n)
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        unsafe { FastPoolAllocator::deallocate(self, ptr, n) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_compare_equal() {
        let a = PoolAllocator::<u64>::new();
        let b = PoolAllocator::<u64>::new();
        assert_eq!(a, b);

        let fast_a = FastPoolAllocator::<u64>::new();
        let fast_b = fast_a;
        assert_eq!(fast_a, fast_b);
    }

    #[test]
    fn zero_count_is_dangling() {
        let alloc = PoolAllocator::<u32>::new();
        let ptr = alloc.allocate(0).expect("zero-count allocation");
        assert_eq!(ptr, NonNull::dangling());
        unsafe { alloc.deallocate(ptr, 0) };
    }

    #[test]
    fn zero_sized_values_bypass_the_pool() {
        struct Empty;
        let alloc = FastPoolAllocator::<Empty>::new();
        let ptr = alloc.allocate(8).expect("zst allocation");
        unsafe { alloc.deallocate(ptr, 8) };
    }

    #[test]
    fn overflowing_counts_are_rejected() {
        let alloc = PoolAllocator::<u64>::new();
        let err = alloc.allocate(usize::MAX).unwrap_err();
        assert!(err.is_size_overflow());

        let fast = FastPoolAllocator::<u64>::new();
        assert!(fast.allocate(usize::MAX).unwrap_err().is_size_overflow());
    }

    #[test]
    fn over_aligned_elements_are_rejected() {
        #[repr(align(64))]
        struct Wide(#[allow(dead_code)] [u8; 64]);

        let alloc = PoolAllocator::<Wide>::new();
        let err = alloc.allocate(1).unwrap_err();
        assert!(err.is_invalid_alignment());
    }
}
