//! Pool statistics snapshot.
//!
//! The pool records structured counters instead of wiring a logging
//! framework into the allocation path; a logger that allocates would
//! re-enter the allocator. The engine crate owns the live atomics and
//! produces this snapshot on demand.

use serde::Serialize;

/// Point-in-time view of pool activity since process start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Batched fetches served by the central cache.
    pub central_fetches: u64,
    /// Central refills that carved a fresh span into blocks.
    pub span_carves: u64,
    /// Bulk returns of thread-cache lists to the central cache.
    pub bulk_returns: u64,
    /// Successful OS reservations.
    pub os_reserves: u64,
    /// Total pages reserved from the OS.
    pub os_pages: u64,
    /// Allocations routed around the tiers straight to the page cache.
    pub bypass_allocs: u64,
    /// Releases routed straight to the page cache.
    pub bypass_frees: u64,
}

impl PoolStats {
    /// Share of central fetches that had to carve a fresh span, in
    /// permille. Zero when no fetch has happened yet.
    #[must_use]
    pub fn carve_rate_permille(&self) -> u16 {
        if self.central_fetches == 0 {
            return 0;
        }
        (self.span_carves.saturating_mul(1000) / self.central_fetches) as u16
    }

    /// Bytes reserved from the OS so far.
    #[must_use]
    pub fn os_bytes(&self, page_size: usize) -> u64 {
        self.os_pages.saturating_mul(page_size as u64)
    }
}
