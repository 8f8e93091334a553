//! Core port: request validation, line splitting and completion bookkeeping.

use cachesim_core::common::{RequestKind, SimError};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{Rig, single_l1};

#[rstest]
#[case(0x0, 1)]
#[case(0xFFFF, 1)]
#[case(0xFFF8, 8)]
fn accesses_inside_the_range_are_accepted(#[case] addr: u64, #[case] size: usize) {
    let mut rig = Rig::new(&single_l1());
    assert!(rig.sim.submit(0, addr, RequestKind::Read { size }).is_ok());
    rig.sim.run().unwrap();
    assert_eq!(rig.sim.drain_completions().len(), 1);
}

#[rstest]
#[case(0x1_0000, 1)]
#[case(0xFFFF, 2)]
#[case(u64::MAX, 8)]
fn accesses_past_the_end_are_rejected(#[case] addr: u64, #[case] size: usize) {
    let mut rig = Rig::new(&single_l1());
    let err = rig.sim.submit(0, addr, RequestKind::Read { size }).unwrap_err();
    assert!(matches!(err, SimError::AddressRange { end: 0xFFFF, .. }), "{err}");
    assert!(rig.sim.idle());
    assert_eq!(rig.sim.stats().cores[0].requests, 0);
}

#[test]
fn invalidate_past_the_end_is_rejected() {
    let mut rig = Rig::new(&single_l1());
    let err = rig.sim.submit(0, 0x2_0000, RequestKind::Invalidate).unwrap_err();
    assert!(matches!(err, SimError::AddressRange { .. }));
}

#[rstest]
#[case(RequestKind::Read { size: 0 })]
#[case(RequestKind::Read { size: 65 })]
#[case(RequestKind::Write { bytes: Vec::new() })]
#[case(RequestKind::Write { bytes: vec![0; 65] })]
fn malformed_sizes_are_rejected(#[case] kind: RequestKind) {
    let mut rig = Rig::new(&single_l1());
    let err = rig.sim.submit(0, 0x100, kind).unwrap_err();
    assert!(matches!(err, SimError::InvalidRequest(_)), "{err}");
}

#[test]
fn unknown_core_is_rejected() {
    let mut rig = Rig::new(&single_l1());
    let err = rig.sim.submit(1, 0x0, RequestKind::Invalidate).unwrap_err();
    assert!(matches!(err, SimError::UnknownCore(1)));
}

#[test]
fn rejected_requests_do_not_consume_ids() {
    let mut rig = Rig::new(&single_l1());
    let first = rig.submit(0, 0x0, RequestKind::Read { size: 1 });
    let _ = rig.sim.submit(0, 0x1_0000, RequestKind::Read { size: 1 });
    let second = rig.submit(0, 0x40, RequestKind::Read { size: 1 });
    assert_eq!(second, first + 1);
}

/// A full-line access is the largest that fits.
#[test]
fn full_line_access() {
    let mut rig = Rig::new(&single_l1());
    let bytes: Vec<u8> = (0..64).collect();
    rig.write(0, 0x200, &bytes);
    assert_eq!(rig.read(0, 0x200, 64), bytes);
}

/// Line-crossing writes and reads are split and merged back transparently.
#[test]
fn split_access_round_trip() {
    let mut rig = Rig::new(&single_l1());
    rig.write(0, 0x3C, &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(rig.read(0, 0x3C, 8), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(rig.read(0, 0x40, 4), vec![5, 6, 7, 8]);

    let stats = rig.sim.stats();
    assert_eq!(stats.cores[0].split, 2);
    assert_eq!(stats.cores[0].requests, 3);
    assert_eq!(stats.cores[0].completed, 3);
    assert_eq!(stats.cache("l1").unwrap().misses, 2);
}

#[test]
fn completion_carries_timing() {
    let mut rig = Rig::new(&single_l1());
    rig.sim.run_until(5_000).unwrap();
    let done = rig.access(0, 0x80, RequestKind::Read { size: 4 });
    assert_eq!(done.core, 0);
    assert_eq!(done.addr, 0x80);
    assert_eq!(done.issued_at, 5_000);
    assert_eq!(done.completed_at, done.issued_at + done.latency());
}

#[test]
fn latency_statistics() {
    let mut rig = Rig::new(&single_l1());
    let _ = rig.read(0, 0x0, 1);
    let _ = rig.read(0, 0x0, 1);
    let core = rig.sim.stats().cores[0].clone();
    assert_eq!(core.completed, 2);
    assert_eq!(core.max_latency, 12_276);
    assert_eq!(core.total_latency, 12_276 + 1_400);
    assert!((core.avg_latency() - 6_838.0).abs() < f64::EPSILON);
}
