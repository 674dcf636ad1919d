//! # stratalloc
//!
//! A three-tier memory pool allocator for small-to-medium requests.
//! Per-thread caches serve hits without synchronisation; misses refill in
//! batches from a central cache of size-segregated free lists; the central
//! cache carves spans obtained from a page-level backing store that deals
//! with the OS. Requests above [`MAX_BYTES`] bypass the tiers and take
//! whole spans directly.
//!
//! The public surface is the [`allocate`] / [`deallocate`] pair. The
//! caller must hand back the same `size` it allocated with; the pool does
//! not derive sizes from pointers.

#![allow(unsafe_code)]

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

pub use stratalloc_core::error::AllocError;
pub use stratalloc_core::size_class::{
    ALIGNMENT, MAX_BYTES, NUM_CLASSES, class_index, class_size, round_up,
};
pub use stratalloc_core::stats::PoolStats;
pub use stratalloc_pool::{PAGE_SIZE, SPAN_PAGES};

use stratalloc_pool::thread_cache;

/// Allocates `size` bytes.
///
/// Returns null only when the OS refuses to provide backing memory. The
/// result is aligned to at least [`ALIGNMENT`]; requests above
/// [`MAX_BYTES`] are page-aligned. A zero `size` yields a valid non-null
/// pointer that must not be dereferenced.
#[must_use]
pub fn allocate(size: usize) -> *mut u8 {
    thread_cache::allocate(size)
}

/// Releases a block obtained from [`allocate`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must have come from [`allocate`] (on any thread), `size` must
/// equal the size passed to that call, and the block must not be released
/// twice.
pub unsafe fn deallocate(ptr: *mut u8, size: usize) {
    let Some(block) = NonNull::new(ptr) else {
        return;
    };
    // SAFETY: forwarded caller contract.
    unsafe { thread_cache::deallocate(block, size) }
}

/// Snapshot of the pool's activity counters.
#[must_use]
pub fn stats() -> PoolStats {
    stratalloc_pool::stats::snapshot()
}

/// Pool-backed implementor of [`GlobalAlloc`].
///
/// Alignments up to [`ALIGNMENT`] map straight onto the pool. A larger
/// alignment rounds the request up to an alignment multiple, which lands
/// it in a class whose size divides by the alignment; span bases are
/// page-aligned, so every block of such a class is aligned. Alignments
/// above [`PAGE_SIZE`] are refused with null.
///
/// Intended for explicit use (benchmarks, embedding), not as the
/// registered `#[global_allocator]`: the pool keeps its span registry in
/// the system heap, and routing the system heap back through the pool
/// would recurse.
pub struct Stratalloc;

impl Stratalloc {
    /// The request size whose serving class satisfies `layout`, or `None`
    /// when the alignment cannot be honoured.
    fn effective_size(layout: Layout) -> Option<usize> {
        let align = layout.align();
        let size = layout.size().max(1);
        if align <= ALIGNMENT {
            return Some(size);
        }
        if align > PAGE_SIZE {
            return None;
        }
        size.checked_next_multiple_of(align)
    }
}

unsafe impl GlobalAlloc for Stratalloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match Self::effective_size(layout) {
            Some(size) => allocate(size),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // The effective size is a pure function of the layout, so it
        // matches the size the block was allocated with.
        if let Some(size) = Self::effective_size(layout) {
            // SAFETY: caller passes the layout it allocated with.
            unsafe { deallocate(ptr, size) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_size_passes_small_alignments_through() {
        let layout = Layout::from_size_align(100, 8).expect("layout");
        assert_eq!(Stratalloc::effective_size(layout), Some(100));
    }

    #[test]
    fn effective_size_rounds_for_large_alignments() {
        let layout = Layout::from_size_align(100, 64).expect("layout");
        assert_eq!(Stratalloc::effective_size(layout), Some(128));

        let layout = Layout::from_size_align(64, 64).expect("layout");
        assert_eq!(Stratalloc::effective_size(layout), Some(64));
    }

    #[test]
    fn effective_size_refuses_beyond_page_alignment() {
        let layout = Layout::from_size_align(16, 2 * PAGE_SIZE).expect("layout");
        assert_eq!(Stratalloc::effective_size(layout), None);
    }

    #[test]
    fn effective_size_never_returns_zero() {
        let layout = Layout::from_size_align(0, 1).expect("layout");
        assert_eq!(Stratalloc::effective_size(layout), Some(1));
    }
}
