//! Segregated-storage pools
//!
//! The layered pool core:
//! - [`SegregatedStorage`] — free list of fixed-size chunks threaded through
//!   the free memory itself
//! - [`Pool`] — combines the storage with an intrusive block list and a
//!   [`BlockAllocator`](crate::allocator::BlockAllocator) backing source;
//!   owns the growth policy, `release_memory` and `purge_memory`
//! - [`SingletonPool`] — lazily initialized, tag-partitioned process-wide
//!   pools
//!
//! ## Modules
//! - `storage` — the free-list engine
//! - `block` — intrusive block-list trailer plumbing
//! - `pool` — the pool core and its configuration
//! - `singleton` — the process-wide pool registry

mod block;
#[allow(clippy::module_inception)]
mod pool;
mod singleton;
mod storage;

pub use pool::{Pool, PoolConfig};
pub use singleton::SingletonPool;
pub use storage::SegregatedStorage;

pub(crate) use block::BlockPtr;
pub(crate) use singleton::pool_handle;

use crate::utils::lcm;

/// Smallest chunk size a pool will use: a free chunk stores a pointer, a
/// block trailer stores a size field, and both must fit the same grid.
pub const MIN_ALLOC_SIZE: usize = lcm(
    core::mem::size_of::<*mut u8>(),
    core::mem::size_of::<usize>(),
);

/// Alignment of every chunk and block a pool hands out.
pub const MIN_ALIGN: usize = lcm(
    core::mem::align_of::<*mut u8>(),
    core::mem::align_of::<usize>(),
);
