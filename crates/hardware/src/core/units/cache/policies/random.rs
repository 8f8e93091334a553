//! Random Replacement Policy.
//!
//! Picks a pseudo-random eligible way using a xorshift64 generator with a
//! fixed seed, so runs are reproducible.

use super::ReplacementPolicy;

/// Random Policy state.
#[derive(Debug)]
pub struct RandomPolicy {
    state: u64,
}

impl RandomPolicy {
    /// Creates a new random policy instance.
    pub const fn new(_sets: usize, _ways: usize) -> Self {
        Self { state: 123456789 }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl ReplacementPolicy for RandomPolicy {
    fn update(&mut self, _set: usize, _way: usize) {}

    fn get_victim(&mut self, _set: usize, eligible: &[bool]) -> Option<usize> {
        let count = eligible.iter().filter(|&&ok| ok).count();
        if count == 0 {
            return None;
        }
        let pick = (self.next() % count as u64) as usize;
        eligible
            .iter()
            .enumerate()
            .filter(|&(_, &ok)| ok)
            .map(|(way, _)| way)
            .nth(pick)
    }
}
