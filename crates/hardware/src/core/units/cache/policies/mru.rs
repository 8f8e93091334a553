//! Most Recently Used (MRU) Replacement Policy.
//!
//! This policy evicts the cache line that was accessed most recently.
//! While counter-intuitive for standard workloads, MRU is optimal for
//! cyclic access patterns (loops) where the dataset is larger than the cache.

use super::ReplacementPolicy;

/// MRU Policy state.
#[derive(Debug)]
pub struct MruPolicy {
    /// A vector of usage stacks (one per set).
    /// Index 0 is the MRU position (victim), last index is LRU.
    usage: Vec<Vec<usize>>,
}

impl MruPolicy {
    /// Creates a new MRU policy instance for `sets` sets of `ways` ways.
    pub fn new(sets: usize, ways: usize) -> Self {
        let usage = (0..sets).map(|_| (0..ways).collect()).collect();
        Self { usage }
    }
}

impl ReplacementPolicy for MruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
        stack.insert(0, way);
    }

    fn get_victim(&mut self, set: usize, eligible: &[bool]) -> Option<usize> {
        self.usage[set]
            .iter()
            .copied()
            .find(|&way| eligible.get(way).copied().unwrap_or(false))
    }
}
