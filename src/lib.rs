//! # segpool
//!
//! Segregated-storage pool allocators: fast fixed-size chunk allocation
//! over raw blocks obtained from the system, with ordered free lists,
//! contiguous multi-chunk allocation and block reclamation.
//!
//! ## Quick Start
//!
//! ```rust
//! use segpool::pool::Pool;
//!
//! // A pool of 64-byte chunks; blocks are acquired lazily.
//! let mut pool = Pool::new(64);
//! let chunk = pool.allocate().expect("out of memory");
//! unsafe { pool.deallocate(chunk) };
//!
//! // Typed facades translate element counts into chunk requests.
//! use segpool::allocator::ScopedPoolAllocator;
//! let alloc = ScopedPoolAllocator::<u64>::new();
//! let values = alloc.allocate(16).expect("out of memory");
//! unsafe { alloc.deallocate(values, 16) };
//! ```
//!
//! ## Architecture
//!
//! - [`pool::SegregatedStorage`] threads a free list of fixed-size chunks
//!   through the free memory itself; no chunk carries metadata.
//! - [`pool::Pool`] grows that storage block-by-block through a pluggable
//!   [`allocator::BlockAllocator`], doubling each block's chunk count, and
//!   can hand fully-free blocks back via `release_memory`.
//! - [`pool::SingletonPool`] partitions lazily-created process-wide pools
//!   by tag type; they are intentionally never destroyed.
//! - [`allocator`] hosts the typed facades: singleton-backed
//!   ([`allocator::PoolAllocator`], [`allocator::FastPoolAllocator`]) and
//!   instance-owned ([`allocator::ScopedPoolAllocator`],
//!   [`allocator::ScopedFastPoolAllocator`]), all implementing
//!   [`allocator::TypedAllocator`].
//! - [`sync`] selects the lock bracketing shared pools at compile time:
//!   [`sync::Locked`] (parking_lot) or the single-threaded [`sync::Unlocked`].
//!
//! ## Features
//!
//! - `logging`: structured trace/debug events for block acquisition and
//!   reclamation via `tracing`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

pub mod allocator;
pub mod error;
pub mod pool;
pub mod sync;
pub mod utils;

pub use crate::error::{AllocError, AllocErrorKind, AllocResult};

/// Convenient re-exports of commonly used types and traits.
pub mod prelude {
    pub use crate::allocator::{
        BlockAllocator, FastPoolAllocator, MallocAllocator, MemoryUsage, PoolAllocator,
        ScopedFastPoolAllocator, ScopedPoolAllocator, SystemAllocator, TypedAllocator,
    };
    pub use crate::error::{AllocError, AllocErrorKind, AllocResult};
    pub use crate::pool::{Pool, PoolConfig, SingletonPool};
    pub use crate::sync::{Locked, PoolLock, Unlocked};
}
