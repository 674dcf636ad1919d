//! Transfer policy between the thread and central tiers.
//!
//! Small classes move in large batches so one lock acquisition amortises
//! many allocations; large classes move a handful at a time so a single
//! refill never drags in an outsized byte volume.

/// Number of blocks a thread cache requests from the central cache in one
/// refill for blocks of `size` bytes. Always at least 1 and bounded.
#[must_use]
pub const fn refill_batch(size: usize) -> usize {
    match size {
        0..=16 => 512,
        17..=64 => 256,
        65..=256 => 64,
        257..=1024 => 16,
        1025..=4096 => 8,
        4097..=16384 => 4,
        _ => 2,
    }
}

/// A thread free list holding more than this many `size`-byte blocks drains
/// back to the central cache. Independent of every other class.
#[must_use]
pub const fn drain_threshold(size: usize) -> usize {
    refill_batch(size)
}
