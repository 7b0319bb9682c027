//! Instance typed allocator facades
//!
//! [`ScopedPoolAllocator`] and [`ScopedFastPoolAllocator`] own their pool
//! instead of naming a process-wide one: each handle holds shared ownership
//! of a lock-wrapped [`Pool`], so clones allocate from the same storage and
//! the pool dies — returning all blocks — when the last handle drops.
//! Useful for pools scoped to a task or data structure.
//!
//! Path disciplines match the singleton facades: the scoped variant always
//! takes the ordered paths, the fast variant switches on the request size.

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;
use std::sync::Arc;

use super::traits::TypedAllocator;
use super::{BlockAllocator, SystemAllocator};
use crate::error::AllocResult;
use crate::pool::{Pool, PoolConfig};
use crate::sync::{Locked, PoolLock};

use super::pool_allocator::{check_element_alignment, check_request_size, exhausted};

macro_rules! scoped_common {
    ($name:ident) => {
        impl<T> $name<T> {
            /// Creates a facade over a fresh pool of `size_of::<T>()`-byte
            /// chunks with default growth parameters, backed by the system
            /// allocator.
            pub fn new() -> Self {
                Self::with_config(PoolConfig::default())
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T, A, L> $name<T, A, L>
        where
            A: BlockAllocator,
            L: PoolLock<Pool<A>>,
        {
            /// Creates a facade over a fresh pool with explicit growth
            /// parameters.
            pub fn with_config(config: PoolConfig) -> Self
            where
                A: Default,
            {
                Self::with_config_in(config, A::default())
            }

            /// Creates a facade over a fresh pool growing through the given
            /// block source.
            pub fn with_config_in(config: PoolConfig, alloc: A) -> Self {
                // Zero-sized element requests never reach the pool; the pool
                // itself still needs a positive chunk size.
                let pool =
                    Pool::with_config_in(mem::size_of::<T>().max(1), config, alloc);
                Self {
                    pool: Arc::new(L::new(pool)),
                    _marker: PhantomData,
                }
            }

            fn with_pool<R>(&self, f: impl FnOnce(&mut Pool<A>) -> R) -> R {
                self.pool.with(f)
            }

            /// Checks whether `ptr` came from this facade's pool.
            pub fn is_from(&self, ptr: NonNull<T>) -> bool {
                self.with_pool(|pool| pool.is_from(ptr.as_ptr().cast_const().cast()))
            }

            /// Releases every fully-free block of the shared pool.
            pub fn release_memory(&self) -> bool {
                self.with_pool(|pool| pool.release_memory())
            }

            /// Unconditionally releases all blocks of the shared pool,
            /// invalidating outstanding allocations from every clone.
            pub fn purge_memory(&self) -> bool {
                self.with_pool(|pool| pool.purge_memory())
            }
        }

        /// Clones share the same pool; no allocation happens.
        impl<T, A, L> Clone for $name<T, A, L>
        where
            A: BlockAllocator,
            L: PoolLock<Pool<A>>,
        {
            fn clone(&self) -> Self {
                Self {
                    pool: Arc::clone(&self.pool),
                    _marker: PhantomData,
                }
            }
        }

        impl<T, A, L> fmt::Debug for $name<T, A, L>
        where
            A: BlockAllocator,
            L: PoolLock<Pool<A>>,
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "<{}>"),
                    core::any::type_name::<T>()
                )
            }
        }

        /// Facades of one type compare equal regardless of which pool they
        /// share.
        impl<T, A, L> PartialEq for $name<T, A, L>
        where
            A: BlockAllocator,
            L: PoolLock<Pool<A>>,
        {
            fn eq(&self, _: &Self) -> bool {
                true
            }
        }

        impl<T, A, L> Eq for $name<T, A, L>
        where
            A: BlockAllocator,
            L: PoolLock<Pool<A>>,
        {
        }
    };
}

/// Typed allocator owning a shared pool; always uses the ordered paths.
///
/// ```
/// use segpool::allocator::ScopedPoolAllocator;
///
/// let alloc = ScopedPoolAllocator::<u64>::new();
/// let ptr = alloc.allocate(8).expect("out of memory");
/// unsafe { alloc.deallocate(ptr, 8) };
/// assert!(alloc.release_memory());
/// ```
pub struct ScopedPoolAllocator<T, A = SystemAllocator, L = Locked<Pool<A>>>
where
    A: BlockAllocator,
    L: PoolLock<Pool<A>>,
{
    pool: Arc<L>,
    _marker: PhantomData<fn() -> (T, A)>,
}

scoped_common!(ScopedPoolAllocator);

impl<T, A, L> ScopedPoolAllocator<T, A, L>
where
    A: BlockAllocator,
    L: PoolLock<Pool<A>>,
{
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
        self.with_pool(|pool| pool.ordered_allocate_n(n))
            .map(NonNull::cast)
            .ok_or_else(|| exhausted::<T>(n))
    }

    /// Returns storage for `n` values; `n == 0` is a no-op.
    ///
    /// # Safety
    /// `ptr` must come from [`allocate`](Self::allocate) on a clone of this
    /// facade with the same `n` and must not be used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        if n == 0 || mem::size_of::<T>() == 0 {
            return;
        }
        self.with_pool(|pool| unsafe { pool.ordered_deallocate_n(ptr.cast(), n) });
    }
}

// SAFETY: chunks come from the shared pool sized and aligned for T and stay
// valid while any clone keeps the pool alive; deallocate requires the
// caller's provenance guarantee.
unsafe impl<T, A, L> TypedAllocator<T> for ScopedPoolAllocator<T, A, L>
where
    A: BlockAllocator,
    L: PoolLock<Pool<A>>,
{
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        ScopedPoolAllocator::allocate(self, n)
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        unsafe { ScopedPoolAllocator::deallocate(self, ptr, n) }
    }
}

/// Typed allocator owning a shared pool, optimized for single objects.
///
/// `n == 1` requests run through the unordered O(1) paths; larger requests
/// through the ordered ones.
pub struct ScopedFastPoolAllocator<T, A = SystemAllocator, L = Locked<Pool<A>>>
where
    A: BlockAllocator,
    L: PoolLock<Pool<A>>,
{
    pool: Arc<L>,
    _marker: PhantomData<fn() -> (T, A)>,
}

scoped_common!(ScopedFastPoolAllocator);

impl<T, A, L> ScopedFastPoolAllocator<T, A, L>
where
    A: BlockAllocator,
    L: PoolLock<Pool<A>>,
{
    /// Allocates storage for `n` values of `T`; `n == 1` runs in O(1).
    pub fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        check_element_alignment::<T>()?;
        check_request_size::<T>(n)?;
        if n == 0 || mem::size_of::<T>() == 0 {
            return Ok(NonNull::dangling());
        }
        let chunk = if n == 1 {
            self.with_pool(|pool| pool.allocate())
        } else {
            self.with_pool(|pool| pool.ordered_allocate_n(n))
        };
        chunk.map(NonNull::cast).ok_or_else(|| exhausted::<T>(n))
    }

    /// Returns storage for `n` values; `n == 0` is a no-op.
    ///
    /// # Safety
    /// Same requirements as [`ScopedPoolAllocator::deallocate`].
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        if n == 0 || mem::size_of::<T>() == 0 {
            return;
        }
        if n == 1 {
            self.with_pool(|pool| unsafe { pool.deallocate(ptr.cast()) });
        } else {
            self.with_pool(|pool| unsafe { pool.deallocate_n(ptr.cast(), n) });
        }
    }
}

// SAFETY: see the ScopedPoolAllocator impl; path choice is symmetric in n.
unsafe impl<T, A, L> TypedAllocator<T> for ScopedFastPoolAllocator<T, A, L>
where
    A: BlockAllocator,
    L: PoolLock<Pool<A>>,
{
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        ScopedFastPoolAllocator::allocate(self, n)
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        unsafe { ScopedFastPoolAllocator::deallocate(self, ptr, n) }
    }
}
