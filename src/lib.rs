// =============================================================================
// xlist-alloc — Explicit Free-List Allocator Core
// =============================================================================
//
// A boundary-tagged, explicit free-list allocator over a linearly
// extensible byte region. This crate implements the block layout and
// free-list engine only — it does not know how to grow the underlying
// heap itself; that is supplied by whoever implements [`HeapExtend`].
//
// DESIGN: explicit doubly linked free list, LIFO insertion, first fit
// ====================================================================
//
// Every block in the heap carries a 4-byte header and a 4-byte footer
// encoding its size and allocated flag (a "boundary tag"), which lets
// the allocator walk to the previous adjacent block in O(1) without a
// separate index. Free blocks additionally store a prev/next link pair
// in their payload, threading every free block into one doubly linked
// list:
//
//   free_listp
//       │
//       ▼
//   ┌──────────┐     ┌──────────────┐     ┌───────────┐
//   │ Free, 32B│ ──→ │  Free, 4096B │ ──→ │ Free, 128B│ ──→ None
//   └──────────┘     └──────────────┘     └───────────┘
//
// Freed blocks are always inserted at the head (LIFO): a block freed a
// moment ago is still hot in cache and is a likely match for the next
// request of similar size. `allocate` walks the list from the head and
// takes the first block that fits (first fit), splitting off any slack
// of at least [`MIN_BLOCK_SIZE`] bytes.
//
// WHY NOT A SIZE-CLASS OR ADDRESS-ORDERED ALLOCATOR?
//   Out of scope for this core. Segregated free lists, best-fit, and
//   address-ordered insertion all trade code size and indirection for
//   space efficiency or predictability this single explicit free list
//   doesn't aim for.
//
// THREAD SAFETY:
//   None. This allocator assumes exclusive access to its `HeapExtend`
//   collaborator and to its own state for the duration of any call;
//   wrapping it in a lock is the caller's responsibility, not this
//   crate's.
//
// =============================================================================

#![cfg_attr(not(test), no_std)]

mod allocator;
mod block;
mod error;
mod extend;
mod freelist;

pub use allocator::Allocator;
pub use error::OomError;
pub use extend::HeapExtend;
