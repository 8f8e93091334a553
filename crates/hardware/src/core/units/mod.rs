//! Functional units of a cache level.
//!
//! This module contains the block store and its replacement policies, the
//! per-level cache controller, the MESI/MSI coherence states and sharer
//! directory, and the hardware prefetchers.

/// Cache block store, replacement policies and the per-level controller.
pub mod cache;

/// MESI/MSI states, permission requests and the sharer directory.
pub mod coherence;

/// Hardware prefetcher implementations (stride, next-line).
pub mod prefetch;
