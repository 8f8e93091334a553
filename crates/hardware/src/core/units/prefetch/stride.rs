//! Stride Prefetcher.
//!
//! A prefetcher that detects constant stride patterns in memory accesses.
//! It keeps one entry per requester stream holding the last line, the stride
//! between the last two accesses, a confidence counter and the furthest line
//! already requested (the frontier).
//!
//! Each observation with a non-zero delta either matches the tracked stride
//! (confidence + 1) or replaces it (confidence reset to 0). Once confidence
//! reaches the threshold, every line up to `last + stride * lookahead` that
//! lies past the frontier is requested. Repeated accesses to the same line
//! are ignored.
//!
//! # Performance
//!
//! - **Time Complexity:** `observe()` is O(L) where L is the lookahead
//! - **Space Complexity:** O(S) where S is the number of streams seen
//! - **Best Case:** Regular strided patterns (array traversals, matrix operations)
//! - **Worst Case:** Irregular or random access patterns (linked lists, hash tables)

use std::collections::HashMap;

use super::Prefetcher;

/// Tracking state of one stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamEntry {
    /// Line index of the last access.
    pub last: u64,
    /// Stride in lines between the last two distinct accesses.
    pub stride: i64,
    /// Consecutive stride matches.
    pub confidence: u32,
    /// Furthest line already requested along the stride.
    pub frontier: u64,
}

/// Stride Prefetcher state.
#[derive(Debug)]
pub struct StridePrefetcher {
    streams: HashMap<u64, StreamEntry>,
    threshold: u32,
    lookahead: u64,
}

impl StridePrefetcher {
    /// Creates a new Stride prefetcher.
    ///
    /// # Arguments
    ///
    /// * `threshold` - Stride matches required before prefetches are issued.
    /// * `lookahead` - How many strides ahead of the last access to run.
    pub fn new(threshold: u32, lookahead: u64) -> Self {
        Self {
            streams: HashMap::new(),
            threshold,
            lookahead: lookahead.max(1),
        }
    }

    /// Current state of `stream`, if it has been observed.
    pub fn entry(&self, stream: u64) -> Option<StreamEntry> {
        self.streams.get(&stream).copied()
    }
}

/// `base + stride * k`, or `None` when it leaves the line index space.
fn step(base: u64, stride: i64, k: u64) -> Option<u64> {
    let offset = stride.checked_mul(i64::try_from(k).ok()?)?;
    base.checked_add_signed(offset)
}

impl Prefetcher for StridePrefetcher {
    fn observe(&mut self, stream: u64, line: u64, _hit: bool) -> Vec<u64> {
        let Some(entry) = self.streams.get_mut(&stream) else {
            let _ = self.streams.insert(
                stream,
                StreamEntry {
                    last: line,
                    frontier: line,
                    ..StreamEntry::default()
                },
            );
            return Vec::new();
        };

        let delta = line.wrapping_sub(entry.last) as i64;
        if delta == 0 {
            return Vec::new();
        }
        if delta == entry.stride {
            entry.confidence = entry.confidence.saturating_add(1);
        } else {
            entry.confidence = 0;
            entry.stride = delta;
            entry.frontier = line;
        }
        entry.last = line;

        if entry.confidence < self.threshold {
            return Vec::new();
        }

        let ahead = |candidate: u64, frontier: u64| {
            if entry.stride > 0 {
                candidate > frontier
            } else {
                candidate < frontier
            }
        };
        let mut prefetches = Vec::new();
        let mut frontier = entry.frontier;
        for k in 1..=self.lookahead {
            let Some(candidate) = step(line, entry.stride, k) else {
                break;
            };
            if ahead(candidate, entry.frontier) {
                prefetches.push(candidate);
                frontier = candidate;
            }
        }
        entry.frontier = frontier;
        prefetches
    }
}
