//! # stratalloc-pool
//!
//! The three-tier engine behind stratalloc: a per-thread block cache, a
//! process-wide central cache of size-segregated free lists, and a
//! page-level backing store carving anonymous mappings into spans.
//!
//! Layering is strict and one-directional: the thread cache calls into the
//! central cache, the central cache calls into the page cache, never the
//! other way. A thread holds at most one central class lock at a time, and
//! the page mutex is ordered below every class lock, so a class lock may be
//! held across a page-cache call.

pub(crate) mod block;
pub mod central_cache;
pub mod page_cache;
pub mod spin;
pub mod stats;
pub mod sys;
pub mod thread_cache;

/// Page granularity of the backing store (bytes).
pub const PAGE_SIZE: usize = 4096;

/// Pages pulled per central refill for classes whose block size fits
/// within that span; larger classes size their span to the block.
pub const SPAN_PAGES: usize = 8;

pub use central_cache::CentralCache;
pub use page_cache::PageCache;
