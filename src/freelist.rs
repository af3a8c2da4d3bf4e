//! Free-list link storage: the prev/next pointers threaded through the
//! payload of every free block.
//!
//! Links are stored as heap-relative `u32` offsets rather than raw
//! pointers, encoded as `Option<NonZeroU32>` with `0` reserved to mean
//! "no link". Safe Rust cannot construct a pointer into heap memory
//! that has not been extended into yet, so termination is an explicit
//! null check rather than the allocated-flag sentinel a pointer-based
//! free list would use.

use core::num::NonZeroU32;

use crate::block::WSIZE;

#[inline]
unsafe fn read_word(ptr: *mut u8) -> u32 {
    unsafe { ptr.cast::<u32>().read() }
}

#[inline]
unsafe fn write_word(ptr: *mut u8, value: u32) {
    unsafe { ptr.cast::<u32>().write(value) }
}

#[inline]
fn decode(raw: u32) -> Option<NonZeroU32> {
    NonZeroU32::new(raw)
}

#[inline]
fn encode(link: Option<NonZeroU32>) -> u32 {
    link.map_or(0, NonZeroU32::get)
}

/// Reads the prev-free link stored at the start of `bp`'s payload.
#[inline]
pub unsafe fn prev_link(bp: *mut u8) -> Option<NonZeroU32> {
    decode(unsafe { read_word(bp) })
}

/// Writes the prev-free link stored at the start of `bp`'s payload.
#[inline]
pub unsafe fn set_prev_link(bp: *mut u8, link: Option<NonZeroU32>) {
    unsafe { write_word(bp, encode(link)) }
}

/// Reads the next-free link stored 4 bytes into `bp`'s payload.
#[inline]
pub unsafe fn next_link(bp: *mut u8) -> Option<NonZeroU32> {
    decode(unsafe { read_word(bp.add(WSIZE)) })
}

/// Writes the next-free link stored 4 bytes into `bp`'s payload.
#[inline]
pub unsafe fn set_next_link(bp: *mut u8, link: Option<NonZeroU32>) {
    unsafe { write_word(bp.add(WSIZE), encode(link)) }
}
