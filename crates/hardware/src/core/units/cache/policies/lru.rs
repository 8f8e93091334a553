//! Least Recently Used (LRU) Replacement Policy.
//!
//! This policy evicts the cache line that has not been accessed for the longest time.
//! It maintains a usage stack for each set. When a line is accessed, it is moved
//! to the top (Most Recently Used position). The bottom of the stack represents
//! the Least Recently Used line. Untouched ways start at the bottom in way order,
//! so ties resolve to the lowest way.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `update()`: O(W) where W is the number of ways (associativity)
//!   - `get_victim()`: O(W), skipping ineligible ways from the bottom
//! - **Space Complexity:** O(S × W) where S is the number of sets
//! - **Best Case:** Working sets that fit in the cache with good temporal locality
//! - **Worst Case:** Scanning patterns larger than cache capacity (thrashing)

use super::ReplacementPolicy;

/// LRU Policy state.
#[derive(Debug)]
pub struct LruPolicy {
    /// A vector of usage stacks (one per set).
    /// Index 0 is MRU, last index is LRU.
    usage: Vec<Vec<usize>>,
}

impl LruPolicy {
    /// Creates a new LRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(sets: usize, ways: usize) -> Self {
        let usage = (0..sets).map(|_| (0..ways).rev().collect()).collect();
        Self { usage }
    }
}

impl ReplacementPolicy for LruPolicy {
    /// Moves the accessed `way` to the front of the usage stack (MRU position).
    fn update(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
        stack.insert(0, way);
    }

    /// Returns the eligible way closest to the bottom of the usage stack.
    fn get_victim(&mut self, set: usize, eligible: &[bool]) -> Option<usize> {
        self.usage[set]
            .iter()
            .rev()
            .copied()
            .find(|&way| eligible.get(way).copied().unwrap_or(false))
    }
}
