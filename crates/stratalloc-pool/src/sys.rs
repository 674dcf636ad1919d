//! OS memory veneer.
//!
//! One primitive: reserve a run of zero-filled, page-aligned, read-write
//! pages through an anonymous private mapping. The pool retains every
//! reservation for the process lifetime, so there is no unmap counterpart.

#![allow(unsafe_code)]

use core::ptr::NonNull;

use crate::PAGE_SIZE;

/// Reserves `pages` zero-filled, page-aligned, read-write pages.
///
/// Returns `None` when the OS refuses the mapping or the byte count
/// overflows. The region is anonymous and private; its contents start as
/// all zero bytes.
#[must_use]
pub fn reserve_pages(pages: usize) -> Option<NonNull<u8>> {
    if pages == 0 {
        return None;
    }
    let bytes = pages.checked_mul(PAGE_SIZE)?;

    // SAFETY: anonymous mapping with no file descriptor; the kernel picks
    // the placement and the returned region is exclusively ours.
    let ptr = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            bytes,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return None;
    }
    NonNull::new(ptr.cast::<u8>())
}
