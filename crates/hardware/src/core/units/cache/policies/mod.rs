//! Cache Replacement Policies.
//!
//! Implements various algorithms for selecting victim lines in set-associative caches.
//! The block store only consults a policy once every way of a set is valid; invalid
//! ways are always filled first. Ways that are pending a fill or locked by an
//! in-flight coherence transaction are masked out through the `eligible` slice.
//!
//! # Policies
//!
//! - `Fifo`: First-In, First-Out.
//! - `Lru`: Least Recently Used.
//! - `Mru`: Most Recently Used.
//! - `Plru`: Pseudo-LRU (MRU-bit).
//! - `Random`: Random selection.

/// First-In, First-Out replacement policy.
pub mod fifo;

/// Least Recently Used replacement policy.
pub mod lru;

/// Most Recently Used replacement policy.
pub mod mru;

/// Pseudo-LRU (MRU-bit) replacement policy.
pub mod plru;

/// Random replacement policy.
pub mod random;

use std::fmt::Debug;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;
pub use mru::MruPolicy;
pub use plru::PlruPolicy;
pub use random::RandomPolicy;

use crate::config::ReplacementPolicy as PolicyType;

/// Trait for cache replacement policies.
///
/// Defines the interface for updating usage state and selecting victim lines.
/// Every operation is O(ways).
pub trait ReplacementPolicy: Debug + Send + Sync {
    /// Updates the policy state when a line is accessed (hit or fill).
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `way` - The way index within the set that was accessed.
    fn update(&mut self, set: usize, way: usize);

    /// Records that a new line was installed in `way`.
    ///
    /// Defaults to [`ReplacementPolicy::update`]; insertion-ordered policies override it.
    fn insert(&mut self, set: usize, way: usize) {
        self.update(set, way);
    }

    /// Selects a victim line to evict from a specific set.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `eligible` - One flag per way; only ways flagged `true` may be chosen.
    ///
    /// # Returns
    ///
    /// The index of the way to evict, or `None` when no way is eligible.
    fn get_victim(&mut self, set: usize, eligible: &[bool]) -> Option<usize>;
}

/// Builds the policy named by the configuration.
pub fn build(kind: PolicyType, sets: usize, ways: usize) -> Box<dyn ReplacementPolicy> {
    match kind {
        PolicyType::Lru => Box::new(LruPolicy::new(sets, ways)),
        PolicyType::Fifo => Box::new(FifoPolicy::new(sets, ways)),
        PolicyType::Mru => Box::new(MruPolicy::new(sets, ways)),
        PolicyType::Plru => Box::new(PlruPolicy::new(sets, ways)),
        PolicyType::Random => Box::new(RandomPolicy::new(sets, ways)),
    }
}
