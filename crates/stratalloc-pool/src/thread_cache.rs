//! Per-thread block cache: the lock-free fast path.
//!
//! Each thread owns one instance, reached through `thread_local!`. The
//! per-class head and count arrays are plain storage because no other
//! thread ever sees them; hits touch no atomics and take no locks. Misses
//! refill in batches from the central cache, and a class list that grows
//! past its drain threshold is handed back to the central cache whole.

#![allow(unsafe_code)]

use core::ptr::{self, NonNull};
use std::cell::RefCell;

use stratalloc_core::policy::{drain_threshold, refill_batch};
use stratalloc_core::size_class::{MAX_BYTES, NUM_CLASSES, class_index, class_size};

use crate::PAGE_SIZE;
use crate::block::{next_of, set_next};
use crate::central_cache::CentralCache;
use crate::page_cache::PageCache;
use crate::stats;

thread_local! {
    static THREAD_CACHE: RefCell<ThreadCache> = RefCell::new(ThreadCache::new());
}

/// Allocates through the calling thread's cache.
///
/// Returns null when the OS is out of memory. A zero `size` is served as a
/// one-byte request, so the result is non-null (and not to be
/// dereferenced). Blocks are aligned to the class alignment; requests
/// above [`MAX_BYTES`] come straight from the page cache, page-aligned.
#[must_use]
pub fn allocate(size: usize) -> *mut u8 {
    THREAD_CACHE
        .try_with(|cache| cache.borrow_mut().allocate(size))
        .unwrap_or_else(|_| orphan_allocate(size))
}

/// Releases through the calling thread's cache.
///
/// # Safety
///
/// `block` must come from [`allocate`] (on any thread) with this exact
/// `size`, and must not be released twice.
pub unsafe fn deallocate(block: NonNull<u8>, size: usize) {
    THREAD_CACHE
        .try_with(|cache| {
            // SAFETY: forwarded caller contract.
            unsafe { cache.borrow_mut().deallocate(block, size) }
        })
        .unwrap_or_else(|_| {
            // SAFETY: forwarded caller contract.
            unsafe { orphan_deallocate(block, size) }
        })
}

/// One thread's size-class lists. Only the owning thread touches an
/// instance, so operations take `&mut self` and storage is plain.
struct ThreadCache {
    free_head: Box<[*mut u8]>,
    free_count: Box<[u32]>,
}

impl ThreadCache {
    fn new() -> Self {
        Self {
            free_head: vec![ptr::null_mut(); NUM_CLASSES].into_boxed_slice(),
            free_count: vec![0u32; NUM_CLASSES].into_boxed_slice(),
        }
    }

    fn allocate(&mut self, size: usize) -> *mut u8 {
        let size = if size == 0 { 1 } else { size };
        if size > MAX_BYTES {
            return bypass_allocate(size);
        }

        let index = class_index(size);
        let head = self.free_head[index];
        if !head.is_null() {
            // SAFETY: list blocks carry their link in the first word.
            self.free_head[index] = unsafe { next_of(head) };
            self.free_count[index] -= 1;
            return head;
        }
        self.fetch_from_central(index)
    }

    /// Refills class `index` from the central cache: the first block goes
    /// to the caller, the rest land on the thread list. The central cache
    /// may deliver fewer blocks than the batch asks for.
    fn fetch_from_central(&mut self, index: usize) -> *mut u8 {
        let batch = refill_batch(class_size(index));
        let Ok(list) = CentralCache::global().fetch_range(index, batch) else {
            return ptr::null_mut();
        };

        let head = list.head.as_ptr();
        // SAFETY: the central cache linked `list.count` blocks from `head`.
        self.free_head[index] = unsafe { next_of(head) };
        self.free_count[index] += (list.count - 1) as u32;
        head
    }

    /// # Safety
    ///
    /// Same contract as the module-level [`deallocate`].
    unsafe fn deallocate(&mut self, block: NonNull<u8>, size: usize) {
        if size > MAX_BYTES {
            bypass_release(block, size);
            return;
        }

        let index = class_index(size);
        // SAFETY: the block is free again; its first word becomes the link.
        unsafe {
            set_next(block.as_ptr(), self.free_head[index]);
        }
        self.free_head[index] = block.as_ptr();
        self.free_count[index] += 1;

        if self.free_count[index] as usize > drain_threshold(class_size(index)) {
            self.drain_class(index);
        }
    }

    /// Sends the whole class-`index` list back to the central cache.
    fn drain_class(&mut self, index: usize) {
        let head = self.free_head[index];
        if head.is_null() {
            return;
        }
        self.free_head[index] = ptr::null_mut();
        self.free_count[index] = 0;
        // SAFETY: the list is null-terminated and every block on it is a
        // free block of class `index` owned by this cache.
        unsafe {
            CentralCache::global().return_range(NonNull::new_unchecked(head), index);
        }
    }
}

impl Drop for ThreadCache {
    /// Residual blocks drain to the central cache at thread exit; nothing
    /// is orphaned with the dying thread.
    fn drop(&mut self) {
        for index in 0..NUM_CLASSES {
            self.drain_class(index);
        }
    }
}

/// Requests too large for any size class go straight to the page cache.
fn bypass_allocate(size: usize) -> *mut u8 {
    let pages = size.div_ceil(PAGE_SIZE);
    match PageCache::global().allocate_span(pages) {
        Ok(base) => {
            stats::record_bypass_alloc();
            base.as_ptr()
        }
        Err(_) => ptr::null_mut(),
    }
}

fn bypass_release(block: NonNull<u8>, size: usize) {
    let pages = size.div_ceil(PAGE_SIZE);
    stats::record_bypass_free();
    PageCache::global().release_span(block, pages);
}

/// Fallback for calls racing thread-local teardown: skip the dead cache
/// and talk to the shared tiers directly.
fn orphan_allocate(size: usize) -> *mut u8 {
    let size = if size == 0 { 1 } else { size };
    if size > MAX_BYTES {
        return bypass_allocate(size);
    }
    match CentralCache::global().fetch_range(class_index(size), 1) {
        Ok(list) => list.head.as_ptr(),
        Err(_) => ptr::null_mut(),
    }
}

/// # Safety
///
/// Same contract as the module-level [`deallocate`].
unsafe fn orphan_deallocate(block: NonNull<u8>, size: usize) {
    if size > MAX_BYTES {
        bypass_release(block, size);
        return;
    }
    // SAFETY: the block is free and becomes a one-element list.
    unsafe {
        set_next(block.as_ptr(), ptr::null_mut());
        CentralCache::global().return_range(block, class_index(size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_path_returns_the_block_just_freed() {
        let mut cache = ThreadCache::new();
        let first = cache.allocate(48);
        assert!(!first.is_null());
        // SAFETY: just allocated with this size.
        unsafe {
            cache.deallocate(NonNull::new_unchecked(first), 48);
        }
        let second = cache.allocate(48);
        assert_eq!(first, second);
    }

    #[test]
    fn refill_stocks_the_class_list() {
        let mut cache = ThreadCache::new();
        let index = class_index(32);
        let block = cache.allocate(32);
        assert!(!block.is_null());
        // One refill batch minus the block just handed out.
        let expected = refill_batch(class_size(index)) - 1;
        assert_eq!(cache.free_count[index] as usize, expected);
        assert!(!cache.free_head[index].is_null());
    }

    #[test]
    fn drain_fires_past_the_threshold() {
        let mut cache = ThreadCache::new();
        let size = 8192usize;
        let index = class_index(size);
        let threshold = drain_threshold(size);

        let blocks: Vec<*mut u8> = (0..=threshold + 1).map(|_| cache.allocate(size)).collect();
        assert!(blocks.iter().all(|block| !block.is_null()));

        for &block in &blocks {
            // SAFETY: each block was allocated above with this size.
            unsafe {
                cache.deallocate(NonNull::new_unchecked(block), size);
            }
        }
        // The drain reset the list; anything left is below the threshold.
        assert!((cache.free_count[index] as usize) <= threshold);
    }

    #[test]
    fn zero_sized_request_yields_a_block() {
        let mut cache = ThreadCache::new();
        let block = cache.allocate(0);
        assert!(!block.is_null());
        // SAFETY: allocated above as a zero-size request.
        unsafe {
            cache.deallocate(NonNull::new_unchecked(block), 0);
        }
    }

    #[test]
    fn oversized_request_bypasses_to_pages() {
        let mut cache = ThreadCache::new();
        let size = MAX_BYTES + 1;
        let block = cache.allocate(size);
        assert!(!block.is_null());
        assert_eq!(block as usize % PAGE_SIZE, 0);
        // SAFETY: allocated above with this size.
        unsafe {
            cache.deallocate(NonNull::new_unchecked(block), size);
        }
    }

    #[test]
    fn module_entry_points_round_trip() {
        let block = allocate(100);
        assert!(!block.is_null());
        // SAFETY: allocated above with this size.
        unsafe {
            deallocate(NonNull::new_unchecked(block), 100);
        }
    }
}
