//! # Block Store Tests
//!
//! Lookup, direct insertion with eviction, way reservation for outstanding
//! fills, and the one-copy-per-tag invariant.

use cachesim_core::common::{ByteSize, LineGeometry};
use cachesim_core::config::{CacheConfig, ReplacementPolicy};
use cachesim_core::core::units::cache::{Allocation, BlockStore};
use cachesim_core::core::units::coherence::MesiState;
use pretty_assertions::assert_eq;

/// 32 KiB, 8-way, 128-byte lines: 32 sets.
fn reference_store() -> BlockStore {
    let config = CacheConfig::default();
    BlockStore::new(&config, LineGeometry::new(128).unwrap())
}

fn small_store(policy: ReplacementPolicy) -> BlockStore {
    let config = CacheConfig {
        cache_size: ByteSize::bytes(512),
        associativity: 2,
        replacement_policy: policy,
        ..CacheConfig::default()
    };
    BlockStore::new(&config, LineGeometry::new(64).unwrap())
}

const SET_STRIDE: u64 = 32 * 128;

#[test]
fn reference_geometry() {
    let store = reference_store();
    assert_eq!(store.sets(), 32);
    assert_eq!(store.ways(), 8);
}

#[test]
fn lookup_hits_after_insert() {
    let mut store = reference_store();
    assert_eq!(store.lookup(0x1000), None);
    assert!(store.insert(0x1000, &[7; 128], MesiState::Exclusive).is_none());
    let slot = store.lookup(0x1010).unwrap();
    assert_eq!(store.line(slot).data[0], 7);
    assert_eq!(store.state_of(0x107f), MesiState::Exclusive);
    assert_eq!(store.state_of(0x1080), MesiState::Invalid);
}

/// Nine lines into one 8-way set: the ninth evicts the least recently used (the first).
#[test]
fn ninth_insert_evicts_lru() {
    let mut store = reference_store();
    for i in 0..8 {
        assert!(store.insert(i * SET_STRIDE, &[i as u8; 128], MesiState::Shared).is_none());
    }
    let evicted = store.insert(8 * SET_STRIDE, &[8; 128], MesiState::Shared).unwrap();
    assert_eq!(evicted.addr, 0);
    assert_eq!(evicted.state, MesiState::Shared);
    assert_eq!(evicted.data, vec![0; 128]);
    assert_eq!(store.lookup(0), None);
    assert_eq!(store.tags_in_set(0).len(), 8);
}

/// A hit refreshes recency, so the next victim is the second line.
#[test]
fn touch_protects_line_from_eviction() {
    let mut store = reference_store();
    for i in 0..8 {
        let _ = store.insert(i * SET_STRIDE, &[0; 128], MesiState::Shared);
    }
    let slot = store.lookup(0).unwrap();
    store.touch(slot);
    let evicted = store.insert(8 * SET_STRIDE, &[0; 128], MesiState::Shared).unwrap();
    assert_eq!(evicted.addr, SET_STRIDE);
    assert!(store.lookup(0).is_some());
}

#[test]
fn reinsert_overwrites_in_place() {
    let mut store = reference_store();
    let _ = store.insert(0x2000, &[1; 128], MesiState::Shared);
    assert!(store.insert(0x2000, &[2; 128], MesiState::Modified).is_none());
    let tags = store.tags_in_set(store.set_of(0x2000));
    assert_eq!(tags.len(), 1);
    assert_eq!(store.state_of(0x2000), MesiState::Modified);
    assert_eq!(store.resident().count(), 1);
}

#[test]
fn invalid_ways_are_used_before_the_policy() {
    let mut store = small_store(ReplacementPolicy::Lru);
    // 4 sets of 2 ways; lines 0x000 and 0x100 share set 0.
    let _ = store.insert(0x000, &[0; 64], MesiState::Shared);
    let held = store.lookup(0x000).unwrap();
    match store.allocate(0x100, |_| false) {
        Allocation::Free(slot) => {
            assert_ne!(slot, held);
            assert_eq!(store.set_of(store.addr_of(slot)), 0);
        }
        other => panic!("expected a free way, got {other:?}"),
    }
}

#[test]
fn reserved_ways_are_not_victims() {
    let mut store = small_store(ReplacementPolicy::Lru);
    let Allocation::Free(first) = store.allocate(0x000, |_| false) else {
        panic!("empty set must have a free way");
    };
    store.reserve(first, 0x000);
    assert_eq!(store.lookup(0x000), None);
    assert_eq!(store.find(0x000), Some(first));

    let Allocation::Free(second) = store.allocate(0x100, |_| false) else {
        panic!("second way must be free");
    };
    assert_ne!(first, second);
    store.reserve(second, 0x100);
    assert!(matches!(store.allocate(0x200, |_| false), Allocation::Blocked));

    store.fill(first, &[9; 64], MesiState::Exclusive);
    match store.allocate(0x200, |_| false) {
        Allocation::Evict { slot, victim } => {
            assert_eq!(slot, first);
            assert_eq!(victim, 0x000);
        }
        other => panic!("expected an eviction, got {other:?}"),
    }
}

#[test]
fn busy_lines_are_not_victims() {
    let mut store = small_store(ReplacementPolicy::Lru);
    let _ = store.insert(0x000, &[0; 64], MesiState::Shared);
    let _ = store.insert(0x100, &[0; 64], MesiState::Shared);
    match store.allocate(0x200, |addr| addr == 0x000) {
        Allocation::Evict { victim, .. } => assert_eq!(victim, 0x100),
        other => panic!("expected an eviction, got {other:?}"),
    }
    assert!(matches!(store.allocate(0x200, |_| true), Allocation::Blocked));
}

#[test]
fn invalidate_can_keep_reservation() {
    let mut store = small_store(ReplacementPolicy::Fifo);
    let _ = store.insert(0x040, &[3; 64], MesiState::Shared);
    let slot = store.lookup(0x040).unwrap();
    store.invalidate(slot, true);
    assert_eq!(store.lookup(0x040), None);
    assert_eq!(store.find(0x040), Some(slot));
    store.invalidate(slot, false);
    assert_eq!(store.find(0x040), None);
}
