//! # Calx
//!
//! A conservative, stop-the-world, mark-and-sweep garbage collector for small
//! language runtimes. Clients allocate through a single entry point and never
//! free; the collector periodically scans the mutator stack for words that
//! look like payload addresses and sweeps everything unreachable back onto an
//! address-ordered, eagerly coalesced free list.
//!
//! ### Properties:
//! * Conservative exact-address marking: a stack or payload word is a
//!   reference iff it equals the first payload byte of a live allocation.
//! * First-fit allocation with tail splitting; fresh memory arrives in
//!   [`MINIMUM_BLOCK_SIZE`] chunks from a pluggable [`MemorySource`].
//! * Collection triggers once allocation demand doubles the surviving live
//!   set, with a [`MINIMUM_THRESHOLD`] floor, for amortized O(1) cost.
//! * Single mutator thread; the collector runs synchronously inside
//!   allocation while the mutator is quiescent.
//!
//! ### Usage:
//!
//! ```rust,no_run
//! unsafe {
//!     calx::global::init();
//!
//!     let list = calx::global::alloc(64);
//!     // the runtime keeps `list` visible on its stack while in use;
//!     // reclamation is automatic from here on
//! }
//! ```
//!
//! Embedders that thread their own heap-manager value (or scan their own
//! root ranges) use [`Calx`] directly.

mod counters;
mod free_list;
mod gc;
mod header;
mod ptr_utils;
mod source;
mod span;
mod stack;

#[cfg(feature = "lock_api")]
mod calxk;
#[cfg(feature = "global")]
pub mod global;

pub use counters::Counters;
pub use free_list::FreeSpans;
pub use gc::{AllocSpans, Calx};
pub use header::{ALLOC_HEADER_SIZE, FREE_HEADER_SIZE, HEADER_DELTA};
pub use source::{MemorySource, MmapSource};
pub use span::Span;

#[cfg(feature = "lock_api")]
pub use calxk::Calxk;

/// Initial and floor collection trigger; prevents thrashing on tiny heaps.
pub const MINIMUM_THRESHOLD: usize = 8 * 1024 * 1024;

/// Floor on a single memory-source request, so small allocations don't each
/// cost a system call.
pub const MINIMUM_BLOCK_SIZE: usize = 4096;
