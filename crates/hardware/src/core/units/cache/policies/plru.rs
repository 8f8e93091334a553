//! Pseudo-LRU (MRU-bit) Replacement Policy.
//!
//! Each way carries one "recently used" bit. An access sets the bit; when every
//! bit in a set would be set, all bits except the accessed way's are cleared.
//! The victim is the lowest eligible way whose bit is clear.

use super::ReplacementPolicy;

/// PLRU Policy state.
#[derive(Debug)]
pub struct PlruPolicy {
    usage: Vec<u64>,
    all_ones: u64,
}

impl PlruPolicy {
    /// Creates a new PLRU policy instance. Associativity above 64 shares bits modulo 64.
    pub fn new(sets: usize, ways: usize) -> Self {
        let all_ones = if ways >= 64 {
            u64::MAX
        } else {
            (1u64 << ways) - 1
        };
        Self {
            usage: vec![0; sets],
            all_ones,
        }
    }
}

impl ReplacementPolicy for PlruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        let mask = 1u64 << (way % 64);
        self.usage[set] |= mask;
        if (self.usage[set] & self.all_ones) == self.all_ones {
            self.usage[set] = mask;
        }
    }

    fn get_victim(&mut self, set: usize, eligible: &[bool]) -> Option<usize> {
        let bits = self.usage[set];
        let candidates = || {
            eligible
                .iter()
                .enumerate()
                .filter(|&(_, &ok)| ok)
                .map(|(way, _)| way)
        };
        candidates()
            .find(|&way| (bits >> (way % 64)) & 1 == 0)
            .or_else(|| candidates().next())
    }
}
