//! Intrusive free-block links.
//!
//! A free block's first machine word doubles as the pointer to the next
//! free block of the same class. Nothing overlays an allocated block; the
//! link exists only while the block sits on a free list. Class sizes never
//! dip below pointer width, so the link always fits.

#![allow(unsafe_code)]

use core::ptr;

/// Reads the next-pointer stored in a free block's first word.
///
/// # Safety
///
/// `block` must point to a free block of at least pointer size whose first
/// word was written by [`set_next`] or [`link_run`].
#[inline]
pub(crate) unsafe fn next_of(block: *mut u8) -> *mut u8 {
    unsafe { *block.cast::<*mut u8>() }
}

/// Writes the next-pointer into a free block's first word.
///
/// # Safety
///
/// `block` must point to writable memory of at least pointer size that no
/// caller currently owns.
#[inline]
pub(crate) unsafe fn set_next(block: *mut u8, next: *mut u8) {
    unsafe {
        *block.cast::<*mut u8>() = next;
    }
}

/// Links `count` consecutive `size`-byte blocks starting at `start` into a
/// null-terminated list.
///
/// # Safety
///
/// `start` must point to `count * size` writable bytes exclusively owned
/// by the caller, with `count >= 1` and `size` at least pointer width.
pub(crate) unsafe fn link_run(start: *mut u8, size: usize, count: usize) {
    unsafe {
        for i in 1..count {
            set_next(start.add((i - 1) * size), start.add(i * size));
        }
        set_next(start.add((count - 1) * size), ptr::null_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_run_chains_and_terminates() {
        let mut backing = [0u8; 64];
        let start = backing.as_mut_ptr();

        // SAFETY: the array provides four exclusive 16-byte blocks.
        unsafe {
            link_run(start, 16, 4);
            assert_eq!(next_of(start), start.add(16));
            assert_eq!(next_of(start.add(16)), start.add(32));
            assert_eq!(next_of(start.add(32)), start.add(48));
            assert!(next_of(start.add(48)).is_null());
        }
    }

    #[test]
    fn single_block_run_is_terminated() {
        let mut backing = [0xFFu8; 8];
        let start = backing.as_mut_ptr();
        // SAFETY: one exclusive 8-byte block.
        unsafe {
            link_run(start, 8, 1);
            assert!(next_of(start).is_null());
        }
    }
}
