//! # Cache Controller Tests
//!
//! One core, one L1 over memory. Exercises hit/miss timing, permissions,
//! dirty eviction, core invalidation, prefetch integration and MSHR
//! backpressure through the public simulator API.
//!
//! Timing reference (defaults: 2.5 GHz core, 2-cycle L1, 300 ps links,
//! 10 ns memory on a 417 ps clock):
//! - hit:  300 (link) + 800 (hit latency) + 300 (link) = 1400 ps
//! - miss: 300 + 800 + 300 → memory at 1400, ready at 11400, next edge 11676,
//!   + 300 to the L1, + 300 to the core = 12276 ps

use cachesim_core::common::RequestKind;
use cachesim_core::config::{CoherenceProtocol, PrefetcherKind};
use cachesim_core::core::units::coherence::MesiState;
use pretty_assertions::assert_eq;

use crate::common::harness::{Rig, config, flat, level, single_l1};

#[test]
fn miss_then_hit_latency() {
    let mut rig = Rig::new(&single_l1());
    let miss = rig.access(0, 0x100, RequestKind::Read { size: 8 });
    assert_eq!(miss.issued_at, 0);
    assert_eq!(miss.latency(), 12_276);

    let hit = rig.access(0, 0x108, RequestKind::Read { size: 8 });
    assert_eq!(hit.latency(), 1_400);

    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.misses, 1);
    assert_eq!(l1.hits, 1);
    assert_eq!(stats.memory.reads, 1);
}

#[test]
fn cold_memory_reads_zero() {
    let mut rig = Rig::new(&single_l1());
    assert_eq!(rig.read(0, 0x2000, 16), vec![0; 16]);
}

/// A lone MESI reader gets E and then writes without another miss.
#[test]
fn exclusive_read_then_silent_write() {
    let mut rig = Rig::new(&single_l1());
    let _ = rig.read(0, 0x40, 4);
    assert_eq!(rig.state("l1", 0x40), MesiState::Exclusive);
    rig.write(0, 0x44, &[1, 2, 3, 4]);
    assert_eq!(rig.state("l1", 0x40), MesiState::Modified);
    assert_eq!(rig.read(0, 0x44, 4), vec![1, 2, 3, 4]);

    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.misses, 1);
    assert_eq!(l1.upgrades, 0);
    assert_eq!(l1.hits, 2);
}

/// MSI never holds E, so the first write after a read is an upgrade.
#[test]
fn msi_read_then_upgrade() {
    let mut rig = Rig::new(&flat(1, CoherenceProtocol::Msi));
    let _ = rig.read(0, 0x80, 1);
    assert_eq!(rig.state("l1", 0x80), MesiState::Shared);
    rig.write(0, 0x80, &[0xAA]);
    assert_eq!(rig.state("l1", 0x80), MesiState::Modified);

    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.upgrades, 1);
    assert_eq!(l1.misses, 1);
}

#[test]
fn write_miss_allocates_modified() {
    let mut rig = Rig::new(&single_l1());
    rig.write(0, 0x300, &[5; 8]);
    assert_eq!(rig.state("l1", 0x300), MesiState::Modified);
    assert_eq!(rig.sim.stats().cache("l1").unwrap().misses, 1);
}

/// 4 KiB, 4-way, 64-byte lines: 16 sets, so lines 1 KiB apart collide.
#[test]
fn dirty_eviction_writes_back_to_memory() {
    let mut rig = Rig::new(&single_l1());
    rig.write(0, 0x0, &[0xDE, 0xAD, 0xBE, 0xEF]);
    for i in 1..=4 {
        let _ = rig.read(0, i * 0x400, 1);
    }
    assert_eq!(rig.state("l1", 0x0), MesiState::Invalid);

    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.evictions, 1);
    assert_eq!(l1.writebacks, 1);
    assert_eq!(stats.memory.writes, 1);

    let memory = rig.sim.memory_mut().unwrap();
    assert_eq!(&memory.read_line(0).unwrap()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(memory.sharers(0).is_empty());

    assert_eq!(rig.read(0, 0x0, 4), vec![0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn clean_eviction_is_not_a_writeback() {
    let mut rig = Rig::new(&single_l1());
    for i in 0..=4 {
        let _ = rig.read(0, i * 0x400, 1);
    }
    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.evictions, 1);
    assert_eq!(l1.writebacks, 0);
    assert_eq!(stats.memory.writes, 0);
}

/// Invalidating twice is the same as invalidating once, and absent lines are acked.
#[test]
fn core_invalidate_is_idempotent() {
    let mut rig = Rig::new(&single_l1());
    rig.write(0, 0x500, &[9, 9]);
    rig.invalidate(0, 0x500);
    assert_eq!(rig.state("l1", 0x500), MesiState::Invalid);
    rig.invalidate(0, 0x500);
    rig.invalidate(0, 0x9000);

    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.invalidations, 1);
    assert_eq!(l1.invalidation_acks, 3);
    assert_eq!(l1.writebacks, 1);
    assert_eq!(stats.memory.writes, 1);
    assert_eq!(rig.read(0, 0x500, 2), vec![9, 9]);
}

/// Unit stride: after the fourth line the next four are already on their way.
#[test]
fn stride_prefetch_runs_ahead_of_demand() {
    let mut l1 = level("l1", 4096, 4);
    l1.prefetcher = PrefetcherKind::Stride;
    let mut rig = Rig::new(&config(1, vec![l1]));
    for line in 0..4 {
        let _ = rig.read(0, line * 64, 8);
    }
    let before = rig.sim.stats().cache("l1").unwrap().clone();
    assert_eq!(before.prefetch_issued, 4);
    assert_eq!(before.misses, 4);

    let hit = rig.access(0, 4 * 64, RequestKind::Read { size: 8 });
    assert_eq!(hit.latency(), 1_400);
    let after = rig.sim.stats().cache("l1").unwrap().clone();
    assert_eq!(after.hits, 1);
    assert_eq!(after.prefetch_used, 1);
    assert_eq!(after.misses, 4);
}

#[test]
fn next_line_prefetch_on_miss() {
    let mut l1 = level("l1", 4096, 4);
    l1.prefetcher = PrefetcherKind::NextLine;
    l1.prefetch_degree = 2;
    let mut rig = Rig::new(&config(1, vec![l1]));
    let _ = rig.read(0, 0x1000, 8);
    assert_eq!(rig.state("l1", 0x1040), MesiState::Exclusive);
    assert_eq!(rig.state("l1", 0x1080), MesiState::Exclusive);
    let _ = rig.read(0, 0x1040, 8);

    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.prefetch_issued, 2);
    assert_eq!(l1.prefetch_used, 1);
    assert_eq!(l1.hits, 1);
}

/// Prefetches past the end of the memory range are dropped, not sent.
#[test]
fn prefetch_outside_range_is_dropped() {
    let mut l1 = level("l1", 4096, 4);
    l1.prefetcher = PrefetcherKind::NextLine;
    let mut rig = Rig::new(&config(1, vec![l1]));
    let _ = rig.read(0, 0xFFC0, 8);
    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert_eq!(l1.prefetch_issued, 0);
    assert_eq!(l1.prefetch_dropped, 1);
}

/// Training a stride toward lines already held fetches nothing new.
#[test]
fn prefetch_of_resident_line_is_dropped() {
    let mut l1 = level("l1", 4096, 4);
    l1.prefetcher = PrefetcherKind::Stride;
    let mut rig = Rig::new(&config(1, vec![l1]));
    for line in 20..25 {
        let _ = rig.read(0, line * 64, 8);
    }
    let before = rig.sim.stats().cache("l1").unwrap().clone();
    assert_eq!(before.prefetch_issued, 5);
    assert_eq!(before.prefetch_dropped, 0);

    for line in 16..20 {
        let _ = rig.read(0, line * 64, 8);
    }
    let after = rig.sim.stats().cache("l1").unwrap().clone();
    assert_eq!(after.prefetch_issued, 5);
    assert_eq!(after.prefetch_dropped, 4);
    assert_eq!(after.misses, before.misses + 4);
    for line in 20..29 {
        assert!(rig.state("l1", line * 64).is_valid());
    }
}

/// With one MSHR, concurrent misses wait their turn but all complete.
#[test]
fn mshr_backpressure_stalls_and_recovers() {
    let mut l1 = level("l1", 4096, 4);
    l1.mshrs = 1;
    let mut rig = Rig::new(&config(1, vec![l1]));
    let ids: Vec<_> = (0..4)
        .map(|i| rig.submit(0, i * 0x40, RequestKind::Read { size: 8 }))
        .collect();
    rig.sim.run().unwrap();
    let done = rig.sim.drain_completions();
    assert_eq!(done.len(), 4);
    let mut completed: Vec<_> = done.iter().map(|c| c.id).collect();
    completed.sort_unstable();
    assert_eq!(completed, ids);

    let stats = rig.sim.stats();
    let l1 = stats.cache("l1").unwrap();
    assert!(l1.stalls > 0);
    assert_eq!(l1.misses, 4);
    assert_eq!(rig.sim.cache("l1").unwrap().mshrs_in_use(), 0);
    assert!(rig.sim.idle());
}

/// Requests to one line are served in arrival order.
#[test]
fn same_line_requests_are_serialized() {
    let mut rig = Rig::new(&single_l1());
    let w = rig.submit(0, 0x600, RequestKind::Write { bytes: vec![1] });
    let r = rig.submit(0, 0x600, RequestKind::Read { size: 1 });
    rig.sim.run().unwrap();
    let done = rig.sim.drain_completions();
    assert_eq!(done.len(), 2);
    let read = done.iter().find(|c| c.id == r).unwrap();
    let write = done.iter().find(|c| c.id == w).unwrap();
    assert!(write.completed_at <= read.completed_at);
    assert_eq!(read.data(), Some(&[1u8][..]));
}
