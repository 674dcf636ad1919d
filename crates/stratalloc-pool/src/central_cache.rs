//! Central cache: size-segregated free lists shared by all threads.
//!
//! One intrusive list head and one spin flag per size class, nothing else.
//! Refills pull a span from the page cache and carve it into equal blocks;
//! bulk returns from thread caches splice whole lists in one acquisition.
//! Block contents handed from one thread to another are ordered by the
//! acquire/release pair on the class flag; the head pointers themselves
//! are accessed relaxed underneath it.

#![allow(unsafe_code)]

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, Ordering};
use std::sync::OnceLock;

use stratalloc_core::error::AllocError;
use stratalloc_core::size_class::{NUM_CLASSES, class_size};

use crate::block::{link_run, next_of, set_next};
use crate::page_cache::PageCache;
use crate::spin::SpinFlag;
use crate::{PAGE_SIZE, SPAN_PAGES, stats};

/// A batch of same-class blocks linked through their first words.
#[derive(Debug)]
pub struct BlockList {
    /// First block of the batch.
    pub head: NonNull<u8>,
    /// Number of blocks reachable from `head` before the null terminator.
    pub count: usize,
}

/// The central tier.
pub struct CentralCache {
    /// Per-class list heads.
    heads: Box<[AtomicPtr<u8>]>,
    /// Per-class flags; each guards exactly its head's list.
    locks: Box<[SpinFlag]>,
}

impl CentralCache {
    fn new() -> Self {
        let heads: Vec<AtomicPtr<u8>> = (0..NUM_CLASSES)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        let locks: Vec<SpinFlag> = (0..NUM_CLASSES).map(|_| SpinFlag::new()).collect();
        Self {
            heads: heads.into_boxed_slice(),
            locks: locks.into_boxed_slice(),
        }
    }

    /// Returns the process-wide instance, created on first use.
    pub fn global() -> &'static CentralCache {
        static CENTRAL_CACHE: OnceLock<CentralCache> = OnceLock::new();
        CENTRAL_CACHE.get_or_init(CentralCache::new)
    }

    /// Removes up to `batch` blocks of class `index`, refilling from the
    /// page cache when the list is empty.
    ///
    /// The returned list may be shorter than `batch` when a fresh span
    /// carves into fewer blocks; it always holds at least one block, each
    /// exactly `class_size(index)` bytes.
    pub fn fetch_range(&self, index: usize, batch: usize) -> Result<BlockList, AllocError> {
        if index >= NUM_CLASSES {
            return Err(AllocError::ClassOutOfRange { index });
        }
        debug_assert!(batch >= 1);

        let _guard = self.locks[index].lock();
        stats::record_central_fetch();

        let head = self.heads[index].load(Ordering::Relaxed);
        if head.is_null() {
            return self.refill_locked(index, batch);
        }

        // Walk up to `batch` nodes and splice the prefix out.
        // SAFETY: every node on this list is a free block of this class
        // carrying a valid link in its first word, and the class flag is
        // held.
        unsafe {
            let mut tail = head;
            let mut count = 1;
            while count < batch && !next_of(tail).is_null() {
                tail = next_of(tail);
                count += 1;
            }
            let rest = next_of(tail);
            set_next(tail, ptr::null_mut());
            self.heads[index].store(rest, Ordering::Relaxed);
            Ok(BlockList {
                head: NonNull::new_unchecked(head),
                count,
            })
        }
    }

    /// Carves a fresh span for class `index`. The caller holds the class
    /// flag; holding it across the page-cache call is fine because the
    /// page mutex is ordered below every class flag.
    fn refill_locked(&self, index: usize, batch: usize) -> Result<BlockList, AllocError> {
        let size = class_size(index);
        let span_pages = if size <= SPAN_PAGES * PAGE_SIZE {
            SPAN_PAGES
        } else {
            size.div_ceil(PAGE_SIZE)
        };
        let total = (span_pages * PAGE_SIZE) / size;
        if total == 0 {
            return Err(AllocError::CarveUnderflow {
                pages: span_pages,
                block_size: size,
            });
        }

        let base = PageCache::global().allocate_span(span_pages)?;
        stats::record_span_carve();

        let handed = batch.min(total);
        // SAFETY: the span is exclusively ours until its blocks are
        // published; block k starts at base + k * size and every class
        // size holds at least one pointer.
        unsafe {
            let start = base.as_ptr();
            link_run(start, size, handed);
            if total > handed {
                let rest = start.add(handed * size);
                link_run(rest, size, total - handed);
                self.heads[index].store(rest, Ordering::Relaxed);
            }
            Ok(BlockList { head: base, count: handed })
        }
    }

    /// Splices a null-terminated list of class-`index` blocks onto the
    /// central list. The incoming list is walked to its terminator,
    /// whatever its length.
    ///
    /// # Safety
    ///
    /// Every block reachable from `head` must be a free `class_size(index)`
    /// byte block originally issued by this pool, owned by the caller and
    /// reachable through no other list.
    pub unsafe fn return_range(&self, head: NonNull<u8>, index: usize) {
        if index >= NUM_CLASSES {
            debug_assert!(false, "return to out-of-range class {index}");
            return;
        }

        let _guard = self.locks[index].lock();
        stats::record_bulk_return();

        // SAFETY: per contract the list is well formed and ours; the class
        // flag orders these writes with the next fetch.
        unsafe {
            let mut tail = head.as_ptr();
            while !next_of(tail).is_null() {
                tail = next_of(tail);
            }
            let current = self.heads[index].load(Ordering::Relaxed);
            set_next(tail, current);
            self.heads[index].store(head.as_ptr(), Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratalloc_core::size_class::class_index;

    #[test]
    fn out_of_range_class_is_rejected() {
        let central = CentralCache::new();
        let err = central.fetch_range(NUM_CLASSES, 1).unwrap_err();
        assert_eq!(err, AllocError::ClassOutOfRange { index: NUM_CLASSES });
    }

    #[test]
    fn refill_hands_out_requested_batch() {
        let central = CentralCache::new();
        let index = class_index(64);
        let list = central.fetch_range(index, 16).expect("refill");
        assert_eq!(list.count, 16);

        // The handed-out list is null-terminated after exactly 16 nodes.
        // SAFETY: blocks come linked from the fetch.
        unsafe {
            let mut node = list.head.as_ptr();
            let mut walked = 1;
            while !next_of(node).is_null() {
                node = next_of(node);
                walked += 1;
            }
            assert_eq!(walked, 16);
        }
    }

    #[test]
    fn remainder_serves_the_next_fetch_without_carving() {
        let central = CentralCache::new();
        let index = class_index(128);
        let first = central.fetch_range(index, 4).expect("carve");
        assert_eq!(first.count, 4);

        // An 8-page span of 128-byte blocks carves 256 blocks; 252 remain,
        // starting right after the handed-out prefix.
        let second = central.fetch_range(index, 252).expect("remainder");
        assert_eq!(second.count, 252);
        let expected = first.head.as_ptr() as usize + 4 * 128;
        assert_eq!(second.head.as_ptr() as usize, expected);
    }

    #[test]
    fn oversized_batch_is_served_partially() {
        let central = CentralCache::new();
        // 128 KiB blocks: the span is sized to the block, so one carve
        // yields a single block however large the batch.
        let index = class_index(128 * 1024);
        let list = central.fetch_range(index, 2).expect("large class");
        assert_eq!(list.count, 1);
    }

    #[test]
    fn returned_blocks_come_back_first() {
        let central = CentralCache::new();
        let index = class_index(256);
        let list = central.fetch_range(index, 8).expect("fetch");
        let returned_head = list.head;

        // SAFETY: the fetched blocks are ours and still linked.
        unsafe {
            central.return_range(returned_head, index);
        }

        let again = central.fetch_range(index, 1).expect("refetch");
        assert_eq!(again.head, returned_head);
    }
}
