//! Size-class arithmetic for small allocations.
//!
//! Requests up to [`MAX_BYTES`] are bucketed along an 8-byte arithmetic
//! progression: class `i` serves blocks of exactly `(i + 1) * 8` bytes.
//! Free blocks carry their list link in their own first word, so the
//! progression never dips below pointer size.

/// Allocation alignment (bytes). A power of two, at least one pointer wide.
pub const ALIGNMENT: usize = 8;

/// Largest request served from the size-class tiers. Anything above goes
/// straight to the page cache.
pub const MAX_BYTES: usize = 256 * 1024;

/// Number of size classes.
pub const NUM_CLASSES: usize = MAX_BYTES / ALIGNMENT;

const _: () = assert!(ALIGNMENT.is_power_of_two());
const _: () = assert!(ALIGNMENT >= core::mem::size_of::<usize>());
const _: () = assert!(MAX_BYTES % ALIGNMENT == 0);

/// Rounds `bytes` up to the next multiple of [`ALIGNMENT`].
#[must_use]
pub const fn round_up(bytes: usize) -> usize {
    (bytes + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Computes the class index serving a request of `bytes`.
///
/// Requests below [`ALIGNMENT`] map to class 0. For any
/// `bytes <= MAX_BYTES` the result is in `0..NUM_CLASSES`.
#[must_use]
pub const fn class_index(bytes: usize) -> usize {
    let bytes = if bytes < ALIGNMENT { ALIGNMENT } else { bytes };
    (bytes + ALIGNMENT - 1) / ALIGNMENT - 1
}

/// Returns the block size served by class `index`.
#[must_use]
pub const fn class_size(index: usize) -> usize {
    (index + 1) * ALIGNMENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_multiples() {
        assert_eq!(round_up(1), 8);
        assert_eq!(round_up(8), 8);
        assert_eq!(round_up(9), 16);
        assert_eq!(round_up(MAX_BYTES), MAX_BYTES);
    }

    #[test]
    fn class_index_clamps_small_requests() {
        assert_eq!(class_index(0), 0);
        assert_eq!(class_index(1), 0);
        assert_eq!(class_index(8), 0);
        assert_eq!(class_index(9), 1);
    }

    #[test]
    fn class_index_boundaries() {
        assert_eq!(class_index(MAX_BYTES), NUM_CLASSES - 1);
        assert_eq!(class_size(NUM_CLASSES - 1), MAX_BYTES);
    }

    #[test]
    fn round_up_agrees_with_class_size() {
        for bytes in 1..=MAX_BYTES {
            let rounded = round_up(bytes);
            assert!(rounded >= bytes);
            assert_eq!(rounded, class_size(class_index(bytes)));
        }
    }

    #[test]
    fn class_sizes_are_aligned() {
        for index in (0..NUM_CLASSES).step_by(97) {
            assert_eq!(class_size(index) % ALIGNMENT, 0);
        }
    }
}
