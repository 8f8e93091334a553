//! Hardware Prefetcher implementations.
//!
//! This module contains the interface and implementations of the prefetchers a
//! cache level can run. Prefetchers work on line indices (address divided by
//! line size) and return candidate lines; the cache decides whether each
//! candidate is actually fetched or dropped.

/// Next-line prefetcher (prefetches sequential cache lines on a miss).
pub mod next_line;

/// Stride prefetcher (detects constant-stride access patterns per stream).
pub mod stride;

use std::fmt::Debug;

pub use self::next_line::NextLinePrefetcher;
pub use self::stride::StridePrefetcher;
use crate::config::{CacheConfig, PrefetcherKind};

/// Trait for cache prefetcher implementations.
///
/// Prefetchers observe demand access patterns and generate prefetch
/// requests to reduce cache miss penalties.
pub trait Prefetcher: Debug + Send + Sync {
    /// Observes a demand access and generates prefetch candidates.
    ///
    /// # Arguments
    ///
    /// * `stream` - Identifier of the requester the access came from
    /// * `line` - Line index that was accessed
    /// * `hit` - Whether the access found the line present
    ///
    /// # Returns
    ///
    /// Line indices to prefetch. Empty if no prefetches are needed.
    fn observe(&mut self, stream: u64, line: u64, hit: bool) -> Vec<u64>;
}

/// Builds the prefetcher selected by `config`, if any.
pub fn build(config: &CacheConfig) -> Option<Box<dyn Prefetcher>> {
    match config.prefetcher {
        PrefetcherKind::None => None,
        PrefetcherKind::Stride => Some(Box::new(StridePrefetcher::new(
            config.prefetch_confidence,
            config.prefetch_lookahead,
        ))),
        PrefetcherKind::NextLine => Some(Box::new(NextLinePrefetcher::new(config.prefetch_degree))),
    }
}
