//! Cache-side components of a core.
//!
//! This module contains the request port that feeds a core's L1 and the
//! units every cache level is assembled from: block store, replacement
//! policies, coherence state machine and prefetchers.

/// CPU-side request port (splitting, merging, completions).
pub mod port;

/// Cache, coherence and prefetch units.
pub mod units;

pub use self::port::{Completion, CorePort};
