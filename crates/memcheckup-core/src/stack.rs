//! Call-site capture.
//!
//! Defect identity and the report both key on fixed-width frame vectors.
//! Captures from equivalent call sites must produce identical tuples, and
//! two vectors compare equal only slot-for-slot including zero padding:
//! partial captures from different call sites must not alias.

/// Frames recorded per call site.
pub const STACK_DEPTH: usize = 8;

/// A fixed-width vector of raw instruction pointers, zero-padded.
pub type CallStack = [usize; STACK_DEPTH];

/// The all-zero stack used when a side of a defect signature has no
/// meaningful capture.
pub const NULL_STACK: CallStack = [0; STACK_DEPTH];

/// Record up to [`STACK_DEPTH`] instruction pointers of the current call
/// site. Kept out of line so the captured frames stay stable across
/// equivalent call sites.
#[inline(never)]
pub fn capture() -> CallStack {
    let mut stack = NULL_STACK;
    let mut depth = 0;
    backtrace::trace(|frame| {
        stack[depth] = frame.ip() as usize;
        depth += 1;
        depth < STACK_DEPTH
    });
    stack
}

/// Throwaway capture issued during initialization. The platform unwinder may
/// allocate lazily on its first use, which would recurse through the hooks
/// once tracing is live.
pub fn warm_up() {
    let _ = capture();
}
