//! Process-wide activity counters.
//!
//! Plain relaxed atomics bumped on the slow paths only; the thread-cache
//! hit path stays untouched. Snapshots are consistent per counter, not
//! across counters.

use core::sync::atomic::{AtomicU64, Ordering};

use stratalloc_core::stats::PoolStats;

static CENTRAL_FETCHES: AtomicU64 = AtomicU64::new(0);
static SPAN_CARVES: AtomicU64 = AtomicU64::new(0);
static BULK_RETURNS: AtomicU64 = AtomicU64::new(0);
static OS_RESERVES: AtomicU64 = AtomicU64::new(0);
static OS_PAGES: AtomicU64 = AtomicU64::new(0);
static BYPASS_ALLOCS: AtomicU64 = AtomicU64::new(0);
static BYPASS_FREES: AtomicU64 = AtomicU64::new(0);

pub(crate) fn record_central_fetch() {
    CENTRAL_FETCHES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_span_carve() {
    SPAN_CARVES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_bulk_return() {
    BULK_RETURNS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_os_reserve(pages: usize) {
    OS_RESERVES.fetch_add(1, Ordering::Relaxed);
    OS_PAGES.fetch_add(pages as u64, Ordering::Relaxed);
}

pub(crate) fn record_bypass_alloc() {
    BYPASS_ALLOCS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_bypass_free() {
    BYPASS_FREES.fetch_add(1, Ordering::Relaxed);
}

/// Snapshots every counter.
#[must_use]
pub fn snapshot() -> PoolStats {
    PoolStats {
        central_fetches: CENTRAL_FETCHES.load(Ordering::Relaxed),
        span_carves: SPAN_CARVES.load(Ordering::Relaxed),
        bulk_returns: BULK_RETURNS.load(Ordering::Relaxed),
        os_reserves: OS_RESERVES.load(Ordering::Relaxed),
        os_pages: OS_PAGES.load(Ordering::Relaxed),
        bypass_allocs: BYPASS_ALLOCS.load(Ordering::Relaxed),
        bypass_frees: BYPASS_FREES.load(Ordering::Relaxed),
    }
}
