//! Native stack headroom for the recursive parts of the crate: the parser
//! and the evaluator.

// Free stack left before descending further.
const RED_ZONE: usize = 256 * 1024;
// Size of each extra segment.
const SEGMENT: usize = 4 * 1024 * 1024;

/// Runs `f`, switching to a fresh heap-allocated stack segment first when
/// the current one is nearly exhausted.
pub(crate) fn grow<R, F: FnOnce() -> R>(f: F) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}
