//! # stratalloc-core
//!
//! Safe policy layer for the stratalloc memory pool: size-class arithmetic,
//! the batch transfer policy between tiers, error kinds, and statistics
//! snapshot types. No `unsafe` code is permitted at the crate level; the
//! pointer-bearing tiers live in `stratalloc-pool`.

#![deny(unsafe_code)]

pub mod error;
pub mod policy;
pub mod size_class;
pub mod stats;

pub use error::AllocError;
pub use stats::PoolStats;
