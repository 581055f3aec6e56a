//! Pool sizing rules.
//!
//! The pool leaves two cores for the host (UI thread, runtime) and never
//! drops below one worker or grows past [`MAX_POOL_SIZE`].

use std::num::NonZeroUsize;

/// Smallest pool that can be created.
pub const MIN_POOL_SIZE: usize = 1;

/// Largest pool that can be created.
pub const MAX_POOL_SIZE: usize = 512;

/// Parallelism assumed when the host does not report one.
pub const DEFAULT_PARALLELISM_HINT: usize = 4;

/// Cores left free for the host when sizing from a hint.
const RESERVED_CORES: usize = 2;

/// Compute the pool size for a given host parallelism hint.
///
/// `clamp(hint - 2, 1, 512)`; a hint below 3 yields a single worker.
pub fn pool_size_for_hint(hint: usize) -> usize {
    clamp_pool_size(hint.saturating_sub(RESERVED_CORES))
}

/// Clamp an explicitly requested size into `MIN_POOL_SIZE..=MAX_POOL_SIZE`.
pub fn clamp_pool_size(size: usize) -> usize {
    size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
}

/// Read the host's parallelism hint, falling back to
/// [`DEFAULT_PARALLELISM_HINT`] when it cannot be determined.
pub fn host_parallelism_hint() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(DEFAULT_PARALLELISM_HINT)
}
