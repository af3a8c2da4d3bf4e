//! The heap-extension collaborator this crate consumes but does not
//! implement — the low-level, byte-oriented region grower.

/// Supplies new heap bytes on demand and reports the heap's current
/// bounds.
///
/// An implementation owns the actual backing memory (a static array, a
/// block obtained from the host OS, a `Vec` in test code) and is
/// responsible for making previously handed-out regions remain valid
/// and contiguous for the lifetime of the allocator.
pub trait HeapExtend {
    /// Grows the heap by `n` bytes and returns the address of the first
    /// newly added byte, or `None` if the environment cannot satisfy
    /// the request.
    ///
    /// `n` is always greater than zero and a multiple of 8 when called
    /// from [`crate::Allocator`].
    fn extend_break(&mut self, n: usize) -> Option<usize>;

    /// The address of the first byte ever handed out.
    fn heap_base(&self) -> usize;

    /// The address one past the last byte ever handed out.
    fn heap_limit(&self) -> usize;
}
