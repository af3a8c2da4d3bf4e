// =============================================================================
// xlist-alloc — Allocator Core
// =============================================================================
//
// Drives the block-format and free-list primitives to service allocate,
// free, resize, and check requests. `block` and `freelist` are private
// implementation details this type composes; `Allocator`, `OomError`,
// and `HeapExtend` are the crate's entire public surface.
//
// HEAP LAYOUT AFTER init():
//
//   ┌────────┬──────────────┬──────────────┬─────────────┐
//   │ 4B pad │ 8B prologue  │ 0B epilogue  │ ... growth   │
//   │        │ (hdr + ftr)  │ (hdr only)   │              │
//   └────────┴──────────────┴──────────────┴─────────────┘
//             ▲
//             heap_listp (payload pointer of the prologue)
//
// `init` requests exactly 16 bytes for this prelude, then immediately
// extends by 16 more to seed the first free block. Requesting more
// bytes up front than this prelude actually writes would leave a gap
// a linear boundary-tag walk can never see past, making `check` falsely
// report corruption after the very first allocation.
//
// =============================================================================

use core::num::NonZeroU32;
use core::ptr;

use crate::block::{self, ALIGNMENT, CHUNKSIZE, DSIZE, MIN_BLOCK_SIZE, WSIZE};
use crate::error::OomError;
use crate::extend::HeapExtend;
use crate::freelist;

/// The explicit free-list allocator core.
///
/// Generic over `E`, the heap-extension collaborator. `E` is typically
/// a thin wrapper around a static array, a bump region obtained from
/// the host OS, or (in tests) a fixed-capacity byte buffer.
pub struct Allocator<E: HeapExtend> {
    env: E,
    heap_base: usize,
    heap_listp: *mut u8,
    free_listp: Option<NonZeroU32>,
}

impl<E: HeapExtend> Allocator<E> {
    /// Lays out the prologue/epilogue prelude and seeds an initial free
    /// block.
    ///
    /// # Errors
    /// Returns [`OomError`] if the environment cannot supply the
    /// initial bytes.
    pub fn init(mut env: E) -> Result<Self, OomError> {
        let prelude = 4 * WSIZE;
        let base = env
            .extend_break(prelude)
            .ok_or_else(|| OomError::new(prelude))?;

        let mut this = Self {
            env,
            heap_base: base,
            heap_listp: ptr::null_mut(),
            free_listp: None,
        };

        unsafe {
            let raw = base as *mut u8;
            block::write_word(raw, 0); // alignment padding
            let prologue_bp = raw.add(2 * WSIZE);
            block::set_block(prologue_bp, DSIZE, true);
            let epilogue_hdr = raw.add(3 * WSIZE);
            block::write_word(epilogue_hdr, block::pack(0, true));
            this.heap_listp = prologue_bp;
        }

        log::debug!("xlist-alloc: heap initialized at base {:#x}", base);
        this.extend(MIN_BLOCK_SIZE)?;
        Ok(this)
    }

    /// Allocates at least `size` bytes, returning an 8-byte-aligned
    /// payload pointer, or null on OOM or when `size == 0`.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let asize = core::cmp::max(block::align_up(size) + DSIZE, MIN_BLOCK_SIZE);

        if let Some(bp) = unsafe { self.find_fit(asize) } {
            unsafe { self.place(bp, asize) };
            return bp;
        }

        let extend_size = core::cmp::max(asize, CHUNKSIZE);
        match self.extend(extend_size) {
            Ok(bp) => {
                unsafe { self.place(bp, asize) };
                bp
            }
            Err(err) => {
                log::warn!("xlist-alloc: allocate({size}) failed: {err}");
                ptr::null_mut()
            }
        }
    }

    /// Releases a block previously returned by [`Allocator::allocate`]
    /// or [`Allocator::resize`]. A null `bp` is a no-op.
    pub fn free(&mut self, bp: *mut u8) {
        if bp.is_null() {
            return;
        }
        unsafe {
            let size = block::get_size(block::header_ptr(bp));
            block::set_block(bp, size, false);
            self.coalesce(bp);
        }
    }

    /// Resizes a block in place when possible, otherwise falls back to
    /// allocate-copy-free. `bp == null` behaves like `allocate(size)`;
    /// `size == 0` behaves like `free(bp)` and returns null.
    pub fn resize(&mut self, bp: *mut u8, size: usize) -> *mut u8 {
        if bp.is_null() {
            return self.allocate(size);
        }
        if size == 0 {
            self.free(bp);
            return ptr::null_mut();
        }

        unsafe {
            let old = block::get_size(block::header_ptr(bp));
            let need = size + DSIZE;

            if old >= need {
                return bp;
            }

            let next = block::next_blkp(bp);
            if !block::get_alloc(block::header_ptr(next)) {
                let combined = old + block::get_size(block::header_ptr(next));
                if combined >= need {
                    self.list_unlink(next);
                    block::set_block(bp, combined, true);
                    return bp;
                }
            }

            let new_bp = self.allocate(size);
            if new_bp.is_null() {
                return ptr::null_mut();
            }
            ptr::copy_nonoverlapping(bp, new_bp, old);
            self.free(bp);
            new_bp
        }
    }

    /// Validates heap consistency (prologue/epilogue integrity, header
    /// and footer agreement, coalescing completeness, and free-list
    /// membership matching the heap's own free blocks), logging a
    /// diagnostic line for each violation found.
    ///
    /// Returns `true` if the heap is consistent.
    pub fn check(&self) -> bool {
        let mut ok = true;

        unsafe {
            let prologue = self.heap_listp;
            if block::get_size(block::header_ptr(prologue)) != DSIZE
                || !block::get_alloc(block::header_ptr(prologue))
            {
                log::warn!("xlist-alloc: check: bad prologue header");
                ok = false;
            }

            let mut bp = prologue;
            let mut prev_was_free = false;
            let mut linear_free_count = 0usize;

            loop {
                let hsize = block::get_size(block::header_ptr(bp));
                if hsize == 0 {
                    break;
                }
                let halloc = block::get_alloc(block::header_ptr(bp));
                let fsize = block::get_size(block::footer_ptr(bp));
                let falloc = block::get_alloc(block::footer_ptr(bp));

                if hsize != fsize || halloc != falloc {
                    log::warn!("xlist-alloc: check: header/footer mismatch at {bp:p}");
                    ok = false;
                }
                if bp != prologue && (hsize < MIN_BLOCK_SIZE || !hsize.is_multiple_of(DSIZE)) {
                    log::warn!("xlist-alloc: check: bad block size {hsize} at {bp:p}");
                    ok = false;
                }
                if !(bp as usize).is_multiple_of(ALIGNMENT) {
                    log::warn!("xlist-alloc: check: misaligned block at {bp:p}");
                    ok = false;
                }

                if !halloc {
                    if prev_was_free {
                        log::warn!("xlist-alloc: check: adjacent free blocks at {bp:p}");
                        ok = false;
                    }
                    linear_free_count += 1;
                    if !self.free_list_contains(bp) {
                        log::warn!("xlist-alloc: check: free block at {bp:p} not on free list");
                        ok = false;
                    }
                }
                prev_was_free = !halloc;
                bp = block::next_blkp(bp);

                if (bp as usize) > self.env.heap_limit() {
                    log::warn!("xlist-alloc: check: traversal ran past heap limit");
                    ok = false;
                    break;
                }
            }

            if !block::get_alloc(block::header_ptr(bp)) {
                log::warn!("xlist-alloc: check: bad epilogue header");
                ok = false;
            }

            let mut list_count = 0usize;
            let mut current = self.free_listp;
            let mut prev_seen: Option<NonZeroU32> = None;
            while let Some(off) = current {
                let fbp = self.ptr_at(off);
                if freelist::prev_link(fbp) != prev_seen {
                    log::warn!("xlist-alloc: check: free-list prev link mismatch at {fbp:p}");
                    ok = false;
                }
                if block::get_alloc(block::header_ptr(fbp)) {
                    log::warn!("xlist-alloc: check: allocated block on free list at {fbp:p}");
                    ok = false;
                }
                list_count += 1;
                prev_seen = current;
                current = freelist::next_link(fbp);
            }

            if list_count != linear_free_count {
                log::warn!(
                    "xlist-alloc: check: free-list count {list_count} != linear free count {linear_free_count}"
                );
                ok = false;
            }
        }

        ok
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn extend(&mut self, size: usize) -> Result<*mut u8, OomError> {
        let asize = core::cmp::max(block::align_up(size), MIN_BLOCK_SIZE);
        let addr = self
            .env
            .extend_break(asize)
            .ok_or_else(|| OomError::new(asize))?;

        let bp = addr as *mut u8;
        unsafe {
            block::set_block(bp, asize, false);
            let epilogue_hdr = block::header_ptr(block::next_blkp(bp));
            block::write_word(epilogue_hdr, block::pack(0, true));
        }

        log::debug!("xlist-alloc: extended heap by {asize} bytes at {addr:#x}");
        Ok(unsafe { self.coalesce(bp) })
    }

    unsafe fn find_fit(&self, asize: usize) -> Option<*mut u8> {
        let mut current = self.free_listp;
        while let Some(off) = current {
            let bp = self.ptr_at(off);
            if unsafe { block::get_size(block::header_ptr(bp)) } >= asize {
                return Some(bp);
            }
            current = unsafe { freelist::next_link(bp) };
        }
        None
    }

    unsafe fn place(&mut self, bp: *mut u8, asize: usize) {
        unsafe {
            let fsize = block::get_size(block::header_ptr(bp));
            self.list_unlink(bp);

            if fsize - asize >= MIN_BLOCK_SIZE {
                block::set_block(bp, asize, true);
                let remainder = block::next_blkp(bp);
                block::set_block(remainder, fsize - asize, false);
                self.coalesce(remainder);
            } else {
                block::set_block(bp, fsize, true);
            }
        }
    }

    /// Merges `bp` (already marked free, not yet on the free list) with
    /// any free neighbors and inserts the result at the free-list head.
    unsafe fn coalesce(&mut self, bp: *mut u8) -> *mut u8 {
        unsafe {
            let prev = block::prev_blkp(bp);
            // Defends against reading a previous-block size before the
            // heap's low end when navigating from the first real block.
            let prev_alloc = ptr::eq(prev, bp) || block::get_alloc(block::header_ptr(prev));
            let next = block::next_blkp(bp);
            let next_alloc = block::get_alloc(block::header_ptr(next));

            let mut result = bp;
            let mut size = block::get_size(block::header_ptr(bp));

            match (prev_alloc, next_alloc) {
                (true, true) => {}
                (true, false) => {
                    self.list_unlink(next);
                    size += block::get_size(block::header_ptr(next));
                    block::set_block(result, size, false);
                }
                (false, true) => {
                    self.list_unlink(prev);
                    size += block::get_size(block::header_ptr(prev));
                    result = prev;
                    block::set_block(result, size, false);
                }
                (false, false) => {
                    self.list_unlink(prev);
                    self.list_unlink(next);
                    size += block::get_size(block::header_ptr(prev));
                    size += block::get_size(block::header_ptr(next));
                    result = prev;
                    block::set_block(result, size, false);
                }
            }

            self.list_insert_head(result);
            result
        }
    }

    unsafe fn list_insert_head(&mut self, bp: *mut u8) {
        let bp_off = self.offset_of(bp);
        unsafe {
            freelist::set_prev_link(bp, None);
            freelist::set_next_link(bp, self.free_listp);
            if let Some(head_off) = self.free_listp {
                freelist::set_prev_link(self.ptr_at(head_off), Some(bp_off));
            }
        }
        self.free_listp = Some(bp_off);
    }

    unsafe fn list_unlink(&mut self, bp: *mut u8) {
        unsafe {
            let prev = freelist::prev_link(bp);
            let next = freelist::next_link(bp);

            match prev {
                Some(prev_off) => freelist::set_next_link(self.ptr_at(prev_off), next),
                None => self.free_listp = next,
            }
            if let Some(next_off) = next {
                freelist::set_prev_link(self.ptr_at(next_off), prev);
            }
        }
    }

    fn free_list_contains(&self, target: *mut u8) -> bool {
        let mut current = self.free_listp;
        while let Some(off) = current {
            let bp = self.ptr_at(off);
            if ptr::eq(bp, target) {
                return true;
            }
            current = unsafe { freelist::next_link(bp) };
        }
        false
    }

    #[inline]
    fn ptr_at(&self, offset: NonZeroU32) -> *mut u8 {
        (self.heap_base + offset.get() as usize) as *mut u8
    }

    #[inline]
    fn offset_of(&self, bp: *mut u8) -> NonZeroU32 {
        let offset = bp as usize - self.heap_base;
        NonZeroU32::new(offset as u32).expect("payload pointer below heap base")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockHeap {
        storage: std::vec::Vec<u8>,
        limit: usize,
    }

    impl MockHeap {
        fn new(capacity: usize) -> Self {
            Self {
                storage: std::vec![0u8; capacity],
                limit: 0,
            }
        }
    }

    impl HeapExtend for MockHeap {
        fn extend_break(&mut self, n: usize) -> Option<usize> {
            if self.limit + n > self.storage.len() {
                return None;
            }
            let addr = self.storage.as_mut_ptr() as usize + self.limit;
            self.limit += n;
            Some(addr)
        }

        fn heap_base(&self) -> usize {
            self.storage.as_ptr() as usize
        }

        fn heap_limit(&self) -> usize {
            self.storage.as_ptr() as usize + self.limit
        }
    }

    fn small_heap() -> Allocator<MockHeap> {
        Allocator::init(MockHeap::new(1 << 16)).expect("init should succeed")
    }

    unsafe fn write_pattern(p: *mut u8, n: usize, seed: u8) {
        unsafe {
            for i in 0..n {
                p.add(i).write(seed.wrapping_add(i as u8));
            }
        }
    }

    unsafe fn pattern_matches(p: *mut u8, n: usize, seed: u8) -> bool {
        unsafe { (0..n).all(|i| p.add(i).read() == seed.wrapping_add(i as u8)) }
    }

    #[test]
    fn init_produces_a_consistent_heap() {
        let a = small_heap();
        assert!(a.check());
    }

    #[test]
    fn allocate_returns_aligned_nonnull_pointers() {
        let mut a = small_heap();
        for size in [1usize, 2, 7, 8, 15, 16, 100, 4096] {
            let p = a.allocate(size);
            assert!(!p.is_null());
            assert_eq!((p as usize) % 8, 0);
        }
        assert!(a.check());
    }

    #[test]
    fn allocate_zero_returns_null() {
        let mut a = small_heap();
        assert!(a.allocate(0).is_null());
    }

    #[test]
    fn scenario_init_allocate_free_check() {
        let mut a = small_heap();
        let p = a.allocate(1);
        assert!(!p.is_null());
        a.free(p);
        assert!(a.check());
    }

    #[test]
    fn scenario_lifo_refit_returns_most_recently_freed_block() {
        let mut a = small_heap();
        let b1 = a.allocate(24);
        let b2 = a.allocate(24);
        assert!(!b1.is_null() && !b2.is_null());
        a.free(b1);
        let b3 = a.allocate(24);
        assert!(ptr::eq(b3, b1));
    }

    #[test]
    fn scenario_free_both_merges_into_one_block() {
        let mut a = small_heap();
        let b1 = a.allocate(16);
        let b2 = a.allocate(16);
        a.free(b2);
        a.free(b1);
        assert!(a.check());
        assert!(a.free_listp.is_some());
        let head = a.ptr_at(a.free_listp.unwrap());
        assert!(unsafe { freelist::next_link(head).is_none() });
    }

    #[test]
    fn scenario_resize_grow_preserves_content() {
        let mut a = small_heap();
        let p = a.allocate(100);
        unsafe { write_pattern(p, 100, 7) };
        let q = a.resize(p, 200);
        assert!(!q.is_null());
        assert!(unsafe { pattern_matches(q, 100, 7) });
        assert!(a.check());
    }

    #[test]
    fn scenario_resize_null_behaves_like_allocate() {
        let mut a = small_heap();
        let p = a.resize(ptr::null_mut(), 64);
        assert!(!p.is_null());
        assert_eq!((p as usize) % 8, 0);
    }

    #[test]
    fn scenario_resize_to_zero_frees_and_returns_null() {
        let mut a = small_heap();
        let p = a.allocate(64);
        let q = a.resize(p, 0);
        assert!(q.is_null());
        assert!(a.check());
    }

    #[test]
    fn resize_shrink_keeps_same_pointer() {
        let mut a = small_heap();
        let p = a.allocate(200);
        unsafe { write_pattern(p, 64, 3) };
        let q = a.resize(p, 64);
        assert!(ptr::eq(p, q));
        assert!(unsafe { pattern_matches(q, 64, 3) });
    }

    #[test]
    fn resize_in_place_grows_into_free_next_block() {
        let mut a = small_heap();
        let p = a.allocate(16);
        let tail = a.allocate(16);
        a.free(tail);
        unsafe { write_pattern(p, 16, 9) };
        let q = a.resize(p, 40);
        assert!(ptr::eq(p, q));
        assert!(unsafe { pattern_matches(q, 16, 9) });
        assert!(a.check());
    }

    #[test]
    fn free_of_null_is_a_no_op() {
        let mut a = small_heap();
        a.free(ptr::null_mut());
        assert!(a.check());
    }

    #[test]
    fn repeated_alloc_free_cycles_stay_consistent() {
        let mut a = small_heap();
        let mut live = std::vec::Vec::new();
        for round in 0..200usize {
            let size = 8 + (round * 13) % 200;
            let p = a.allocate(size);
            assert!(!p.is_null());
            live.push(p);
            if round % 3 == 0 {
                if let Some(victim) = live.pop() {
                    a.free(victim);
                }
            }
        }
        for p in live {
            a.free(p);
        }
        assert!(a.check());
    }

    #[test]
    fn allocate_extends_heap_when_free_list_is_exhausted() {
        let mut a = small_heap();
        let mut total = 0usize;
        let mut last = ptr::null_mut();
        while total < 8192 {
            last = a.allocate(64);
            assert!(!last.is_null());
            total += 64;
        }
        assert!(!last.is_null());
        assert!(a.check());
    }

    #[test]
    fn init_reports_oom_when_environment_has_no_room() {
        let result = Allocator::init(MockHeap::new(8));
        assert!(result.is_err());
    }

    #[test]
    fn allocate_reports_oom_as_null_without_panicking() {
        let mut a = Allocator::init(MockHeap::new(64)).expect("init should succeed");
        let p = a.allocate(1 << 20);
        assert!(p.is_null());
    }
}
