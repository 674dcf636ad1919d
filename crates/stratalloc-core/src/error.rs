//! Allocation error kinds.
//!
//! The internal tier seams report typed errors; the public façade flattens
//! every one of them to a null pointer, so none escape the API.

use thiserror::Error;

/// Errors surfaced by the central and page tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// A size-class index outside `0..NUM_CLASSES` reached the central
    /// cache. Only a caller or tier bug produces this.
    #[error("size class index {index} out of range")]
    ClassOutOfRange {
        /// The offending index.
        index: usize,
    },

    /// The operating system refused to reserve more memory.
    #[error("operating system refused to reserve {pages} pages")]
    OsExhausted {
        /// Pages requested by the failed reservation.
        pages: usize,
    },

    /// A span was too small to carve even one block of its class.
    #[error("span of {pages} pages cannot hold one {block_size}-byte block")]
    CarveUnderflow {
        /// Pages in the undersized span.
        pages: usize,
        /// Block size the carve was attempted for.
        block_size: usize,
    },
}
