//! Page-level backing store.
//!
//! All memory the pool ever obtains from the OS lives here, tracked as
//! spans: contiguous page runs with a descriptor in the address registry.
//! A free span additionally sits in the bucket keyed by its page count, so
//! a request takes the smallest sufficient bucket and splits off any
//! excess. A released span merges with its forward neighbour when that
//! neighbour is free; no backward merge is attempted because only start
//! addresses are indexed. Reservations are never handed back to the OS.

#![allow(unsafe_code)]

use core::ptr::{self, NonNull};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use parking_lot::Mutex;

use stratalloc_core::error::AllocError;

use crate::{PAGE_SIZE, stats, sys};

/// Descriptor for one contiguous run of pages.
struct Span {
    /// Starting address; always page-aligned.
    base: usize,
    /// Length in pages.
    pages: usize,
    /// Next span in the same free bucket; null when allocated or last.
    next: *mut Span,
    /// Whether the span currently sits in a free bucket.
    free: bool,
}

/// Map state guarded by the page mutex.
struct SpanMaps {
    /// Page count -> head of the free-span list for that count.
    free_by_pages: BTreeMap<usize, *mut Span>,
    /// Start address -> descriptor, for every span ever created.
    span_by_addr: HashMap<usize, *mut Span>,
}

// SAFETY: the raw span pointers are only created from leaked boxes and only
// dereferenced while the page mutex is held.
unsafe impl Send for SpanMaps {}

impl SpanMaps {
    /// Unlinks and returns the head span of the smallest bucket holding at
    /// least `pages` pages.
    fn take_free_span(&mut self, pages: usize) -> Option<*mut Span> {
        let (&key, &head) = self.free_by_pages.range(pages..).next()?;
        // SAFETY: bucket members are live descriptors; the caller holds
        // the page mutex.
        unsafe {
            let next = (*head).next;
            if next.is_null() {
                self.free_by_pages.remove(&key);
            } else {
                self.free_by_pages.insert(key, next);
            }
            (*head).next = ptr::null_mut();
            (*head).free = false;
        }
        Some(head)
    }

    /// Splits everything past `pages` off `span` into its own free span.
    ///
    /// # Safety
    ///
    /// `span` must be a live descriptor with at least `pages` pages, owned
    /// by the caller (in neither bucket nor any free list), and the page
    /// mutex must be held.
    unsafe fn split_excess(&mut self, span: *mut Span, pages: usize) {
        // SAFETY: per contract, `span` is live and exclusively ours.
        unsafe {
            let excess = (*span).pages - pages;
            if excess == 0 {
                return;
            }
            let tail_base = (*span).base + pages * PAGE_SIZE;
            let tail = Box::into_raw(Box::new(Span {
                base: tail_base,
                pages: excess,
                next: ptr::null_mut(),
                free: false,
            }));
            self.span_by_addr.insert(tail_base, tail);
            self.link_free(tail);
            (*span).pages = pages;
        }
    }

    /// Pushes `span` onto the head of the bucket for its page count.
    ///
    /// # Safety
    ///
    /// `span` must be a live descriptor not currently in any bucket, and
    /// the page mutex must be held.
    unsafe fn link_free(&mut self, span: *mut Span) {
        // SAFETY: per contract.
        unsafe {
            let pages = (*span).pages;
            let head = self.free_by_pages.get(&pages).copied();
            (*span).next = head.unwrap_or(ptr::null_mut());
            (*span).free = true;
            self.free_by_pages.insert(pages, span);
        }
    }

    /// Removes `span` from the bucket for its page count.
    ///
    /// # Safety
    ///
    /// `span` must be a live descriptor currently linked in the bucket for
    /// its page count, and the page mutex must be held.
    unsafe fn unlink_free(&mut self, span: *mut Span) {
        // SAFETY: per contract, the bucket exists and contains `span`.
        unsafe {
            let pages = (*span).pages;
            let head = self
                .free_by_pages
                .get(&pages)
                .copied()
                .expect("free span has a bucket");
            if head == span {
                let next = (*span).next;
                if next.is_null() {
                    self.free_by_pages.remove(&pages);
                } else {
                    self.free_by_pages.insert(pages, next);
                }
            } else {
                let mut prev = head;
                while (*prev).next != span {
                    prev = (*prev).next;
                    debug_assert!(!prev.is_null(), "span missing from its bucket");
                }
                (*prev).next = (*span).next;
            }
            (*span).next = ptr::null_mut();
            (*span).free = false;
        }
    }
}

/// The page-level singleton: spans in, spans out, one mutex.
pub struct PageCache {
    maps: Mutex<SpanMaps>,
}

impl PageCache {
    fn new() -> Self {
        Self {
            maps: Mutex::new(SpanMaps {
                free_by_pages: BTreeMap::new(),
                span_by_addr: HashMap::new(),
            }),
        }
    }

    /// Returns the process-wide instance, created on first use.
    pub fn global() -> &'static PageCache {
        static PAGE_CACHE: OnceLock<PageCache> = OnceLock::new();
        PAGE_CACHE.get_or_init(PageCache::new)
    }

    /// Allocates a span of exactly `pages` pages and returns its base.
    ///
    /// Free spans are reused best-fit (smallest sufficient bucket), with
    /// any excess split off into its own free span; otherwise a fresh
    /// reservation is made. The returned span's page count equals the
    /// request exactly.
    pub fn allocate_span(&self, pages: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(pages >= 1);
        let mut maps = self.maps.lock();

        if let Some(span) = maps.take_free_span(pages) {
            // SAFETY: `span` was just unlinked, so it is exclusively ours;
            // the mutex is held.
            let base = unsafe {
                maps.split_excess(span, pages);
                (*span).base
            };
            return Ok(
                // SAFETY: span bases come from successful reservations and
                // are never null.
                unsafe { NonNull::new_unchecked(base as *mut u8) },
            );
        }

        let base = sys::reserve_pages(pages).ok_or(AllocError::OsExhausted { pages })?;
        stats::record_os_reserve(pages);
        let span = Box::into_raw(Box::new(Span {
            base: base.as_ptr() as usize,
            pages,
            next: ptr::null_mut(),
            free: false,
        }));
        maps.span_by_addr.insert(base.as_ptr() as usize, span);
        Ok(base)
    }

    /// Releases a span previously returned by [`PageCache::allocate_span`].
    ///
    /// `pages` must be the page count the span was allocated with. Unknown
    /// pointers are ignored (this layer only issues bases it has
    /// registered, so a miss is caller misuse), as are repeated releases
    /// of an already-free span.
    pub fn release_span(&self, base: NonNull<u8>, pages: usize) {
        let addr = base.as_ptr() as usize;
        let mut maps = self.maps.lock();

        let Some(&span) = maps.span_by_addr.get(&addr) else {
            return;
        };

        // SAFETY: descriptors live for the process lifetime and the mutex
        // is held throughout.
        unsafe {
            if (*span).free {
                return;
            }
            debug_assert_eq!((*span).pages, pages, "release with mismatched page count");

            // Forward coalesce: absorb the adjacent span when it is free.
            let next_addr = addr + pages * PAGE_SIZE;
            let neighbour = maps.span_by_addr.get(&next_addr).copied();
            if let Some(neighbour) = neighbour
                && (*neighbour).free
            {
                maps.unlink_free(neighbour);
                (*span).pages += (*neighbour).pages;
                maps.span_by_addr.remove(&next_addr);
                drop(Box::from_raw(neighbour));
            }

            maps.link_free(span);
        }
    }
}
