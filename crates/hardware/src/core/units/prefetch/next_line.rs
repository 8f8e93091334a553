//! Next-Line Prefetcher.
//!
//! A simple spatial prefetcher that fetches the next sequential cache line(s)
//! whenever a demand access misses. This exploits the spatial locality common
//! in sequential data arrays.

use super::Prefetcher;

/// Next-Line Prefetcher state.
#[derive(Debug)]
pub struct NextLinePrefetcher {
    /// Number of subsequent lines to prefetch (prefetch degree).
    degree: u64,
}

impl NextLinePrefetcher {
    /// Creates a new Next-Line prefetcher fetching `degree` lines per miss.
    pub fn new(degree: u64) -> Self {
        Self {
            degree: degree.max(1),
        }
    }
}

impl Prefetcher for NextLinePrefetcher {
    fn observe(&mut self, _stream: u64, line: u64, hit: bool) -> Vec<u64> {
        if hit {
            return Vec::new();
        }
        (1..=self.degree)
            .filter_map(|k| line.checked_add(k))
            .collect()
    }
}
