//! # Cache Replacement Policy Tests
//!
//! Verifies victim selection for LRU, FIFO, PLRU, MRU and Random. Every policy
//! takes an eligibility mask; ineligible ways (pending fills, busy lines) are
//! never chosen.

use cachesim_core::config::ReplacementPolicy as PolicyType;
use cachesim_core::core::units::cache::policies::{
    self, FifoPolicy, LruPolicy, MruPolicy, PlruPolicy, RandomPolicy, ReplacementPolicy,
};
use rstest::rstest;

const ALL4: [bool; 4] = [true; 4];

// ══════════════════════════════════════════════════════════
// 1. LRU
// ══════════════════════════════════════════════════════════

/// Untouched ways tie; the lowest way goes first.
#[test]
fn lru_initial_victim_is_way_zero() {
    let mut policy = LruPolicy::new(1, 4);
    assert_eq!(policy.get_victim(0, &ALL4), Some(0));
}

#[test]
fn lru_evicts_least_recent_after_reaccess() {
    let mut policy = LruPolicy::new(1, 4);
    for way in 0..4 {
        policy.update(0, way);
    }
    assert_eq!(policy.get_victim(0, &ALL4), Some(0));

    policy.update(0, 0);
    assert_eq!(policy.get_victim(0, &ALL4), Some(1));

    policy.update(0, 1);
    assert_eq!(policy.get_victim(0, &ALL4), Some(2));
}

#[test]
fn lru_skips_ineligible_ways() {
    let mut policy = LruPolicy::new(1, 4);
    for way in 0..4 {
        policy.update(0, way);
    }
    assert_eq!(policy.get_victim(0, &[false, true, true, true]), Some(1));
    assert_eq!(policy.get_victim(0, &[false; 4]), None);
}

#[test]
fn lru_sets_are_independent() {
    let mut policy = LruPolicy::new(2, 2);
    policy.update(0, 0);
    policy.update(0, 1);
    policy.update(1, 1);
    policy.update(1, 0);
    assert_eq!(policy.get_victim(0, &[true; 2]), Some(0));
    assert_eq!(policy.get_victim(1, &[true; 2]), Some(1));
}

// ══════════════════════════════════════════════════════════
// 2. FIFO
// ══════════════════════════════════════════════════════════

#[test]
fn fifo_ignores_hits() {
    let mut policy = FifoPolicy::new(1, 4);
    for way in [2, 0, 3, 1] {
        policy.insert(0, way);
    }
    policy.update(0, 2);
    assert_eq!(policy.get_victim(0, &ALL4), Some(2));
    policy.insert(0, 2);
    assert_eq!(policy.get_victim(0, &ALL4), Some(0));
}

// ══════════════════════════════════════════════════════════
// 3. MRU
// ══════════════════════════════════════════════════════════

#[test]
fn mru_evicts_most_recent() {
    let mut policy = MruPolicy::new(1, 4);
    policy.update(0, 1);
    policy.update(0, 3);
    assert_eq!(policy.get_victim(0, &ALL4), Some(3));
    assert_eq!(policy.get_victim(0, &[true, true, true, false]), Some(1));
}

// ══════════════════════════════════════════════════════════
// 4. PLRU
// ══════════════════════════════════════════════════════════

#[test]
fn plru_picks_first_clear_bit() {
    let mut policy = PlruPolicy::new(1, 4);
    policy.update(0, 0);
    policy.update(0, 1);
    assert_eq!(policy.get_victim(0, &ALL4), Some(2));
}

/// Setting the last bit clears all others.
#[test]
fn plru_resets_when_saturated() {
    let mut policy = PlruPolicy::new(1, 4);
    for way in 0..4 {
        policy.update(0, way);
    }
    assert_eq!(policy.get_victim(0, &ALL4), Some(0));
}

#[test]
fn plru_handles_64_ways() {
    let mut policy = PlruPolicy::new(1, 64);
    for way in 0..63 {
        policy.update(0, way);
    }
    assert_eq!(policy.get_victim(0, &[true; 64]), Some(63));
}

// ══════════════════════════════════════════════════════════
// 5. Random
// ══════════════════════════════════════════════════════════

#[test]
fn random_only_picks_eligible_ways() {
    let mut policy = RandomPolicy::new(1, 8);
    let eligible = [false, true, false, true, false, false, true, false];
    for _ in 0..200 {
        let way = policy.get_victim(0, &eligible).unwrap();
        assert!(eligible[way]);
    }
    assert_eq!(policy.get_victim(0, &[false; 8]), None);
}

#[test]
fn random_is_deterministic() {
    let mut a = RandomPolicy::new(1, 8);
    let mut b = RandomPolicy::new(1, 8);
    let picks_a: Vec<_> = (0..16).map(|_| a.get_victim(0, &[true; 8])).collect();
    let picks_b: Vec<_> = (0..16).map(|_| b.get_victim(0, &[true; 8])).collect();
    assert_eq!(picks_a, picks_b);
}

// ══════════════════════════════════════════════════════════
// 6. Factory
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(PolicyType::Lru)]
#[case(PolicyType::Fifo)]
#[case(PolicyType::Mru)]
#[case(PolicyType::Plru)]
#[case(PolicyType::Random)]
fn built_policies_respect_eligibility(#[case] kind: PolicyType) {
    let mut policy = policies::build(kind, 4, 4);
    for way in 0..4 {
        policy.insert(2, way);
    }
    assert_eq!(policy.get_victim(2, &[false, false, true, false]), Some(2));
    assert_eq!(policy.get_victim(2, &[false; 4]), None);
}
