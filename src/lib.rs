//! paraseq - lazy, indexable sequences with parallel prefetching
//!
//! This crate composes dataset-style sequences the way an input pipeline
//! does: a sequence is anything implementing [`Indexable`] (length plus a
//! by-index getter), and a handful of views reindex, cache, or transform
//! one lazily into another without copying the underlying data. On top of
//! that sit two concurrency primitives for turning a lazily-computed
//! sequence into actual throughput:
//!
//! - [`par_iter`] iterates an [`Indexable`] using a fixed pool of worker
//!   threads, fetching elements out of order but yielding them back in
//!   their original order.
//! - [`chunk_load`] streams K parallel iterators into caller-owned ring
//!   buffers on a background thread, yielding a view every time a chunk
//!   fills up — the shape of a minibatch loader.
//!
//! # Example
//!
//! ```
//! use paraseq::{par_iter, smap, Indexable};
//!
//! let data: Vec<i32> = (0..100).collect();
//! let doubled = smap(data, |x| x * 2);
//!
//! let mut total = 0i32;
//! for item in par_iter(doubled, 4) {
//!     total += item.expect("access never fails here");
//! }
//! assert_eq!(total, (0..100).map(|x| x * 2).sum());
//! ```
//!
//! Failures while reading a source (a panic inside `Indexable::get` or
//! inside a source iterator's `next`) are caught at the worker boundary
//! and surfaced as a single [`AccessError`] type rather than propagating
//! as a raw panic across threads.

mod chunk_load;
mod config;
mod error;
mod indexable;
mod invariants;
mod par_iter;
mod semaphore;
mod views;

pub use chunk_load::{chunk_load, chunk_load_with_config, Buffer, ChunkLoad, ChunkView};
pub use config::{ChunkLoadConfig, ParIterConfig};
pub use error::{AccessError, SourceCause};
pub use indexable::Indexable;
pub use par_iter::{par_iter, par_iter_with_config, ParIter};
pub use views::{add_cache, smap, subset, Cache, Map, Subset};
