//! First-In, First-Out (FIFO) Replacement Policy.
//!
//! Evicts the line that was installed earliest, regardless of how often it
//! has been hit since. Hits do not change the order.

use std::collections::VecDeque;

use super::ReplacementPolicy;

/// FIFO Policy state: per-set installation order, oldest first.
#[derive(Debug)]
pub struct FifoPolicy {
    order: Vec<VecDeque<usize>>,
}

impl FifoPolicy {
    /// Creates a new FIFO policy instance for `sets` sets of `ways` ways.
    pub fn new(sets: usize, ways: usize) -> Self {
        let order = (0..sets).map(|_| (0..ways).collect()).collect();
        Self { order }
    }
}

impl ReplacementPolicy for FifoPolicy {
    fn update(&mut self, _set: usize, _way: usize) {}

    fn insert(&mut self, set: usize, way: usize) {
        let queue = &mut self.order[set];
        if let Some(pos) = queue.iter().position(|&x| x == way) {
            let _ = queue.remove(pos);
        }
        queue.push_back(way);
    }

    fn get_victim(&mut self, set: usize, eligible: &[bool]) -> Option<usize> {
        self.order[set]
            .iter()
            .copied()
            .find(|&way| eligible.get(way).copied().unwrap_or(false))
    }
}
