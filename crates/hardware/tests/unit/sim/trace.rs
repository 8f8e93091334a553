//! Trace format: parsing, errors and replay.

use std::io::Write as _;

use cachesim_core::common::{RequestKind, SimError};
use cachesim_core::sim::trace::{self, DEFAULT_READ_SIZE, TraceOp};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{Rig, flat, single_l1};
use cachesim_core::config::CoherenceProtocol;

#[test]
fn parses_every_operation() {
    let text = "\
# header comment
0 R 0x1000 4
0 r 0x1008          # default size

1 W 0x40 deadBEEF
@2500 0 I 4096
";
    let ops = trace::parse(text).unwrap();
    assert_eq!(ops, vec![
        TraceOp {
            at: None,
            core: 0,
            addr: 0x1000,
            kind: RequestKind::Read { size: 4 },
        },
        TraceOp {
            at: None,
            core: 0,
            addr: 0x1008,
            kind: RequestKind::Read {
                size: DEFAULT_READ_SIZE
            },
        },
        TraceOp {
            at: None,
            core: 1,
            addr: 0x40,
            kind: RequestKind::Write {
                bytes: vec![0xDE, 0xAD, 0xBE, 0xEF]
            },
        },
        TraceOp {
            at: Some(2_500),
            core: 0,
            addr: 4096,
            kind: RequestKind::Invalidate,
        },
    ]);
}

#[test]
fn write_data_may_carry_a_prefix() {
    let ops = trace::parse("0 W 0x0 0x0102").unwrap();
    assert_eq!(ops[0].kind, RequestKind::Write { bytes: vec![1, 2] });
}

#[rstest]
#[case("0 R", 1)]
#[case("x R 0x0", 1)]
#[case("0 Q 0x0", 1)]
#[case("0 R 0x0 many", 1)]
#[case("0 W 0x0", 1)]
#[case("0 W 0x0 abc", 1)]
#[case("0 W 0x0 zz", 1)]
#[case("0 W 0x0 é1", 1)]
#[case("0 I 0x0 8", 1)]
#[case("0 R 0x0 8 9", 1)]
#[case("@soon 0 R 0x0", 1)]
#[case("0 R 0x0\n\n# ok\n0 R nowhere", 4)]
fn malformed_lines_report_their_number(#[case] text: &str, #[case] line: usize) {
    let err = trace::parse(text).unwrap_err();
    assert!(
        matches!(err, SimError::Trace { line: l, .. } if l == line),
        "{text:?}: {err}"
    );
}

#[test]
fn load_reads_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "0 W 0x80 ff").unwrap();
    writeln!(file, "0 R 0x80 1").unwrap();
    let ops = trace::load(file.path()).unwrap();
    assert_eq!(ops.len(), 2);
}

#[test]
fn load_missing_file() {
    let err = trace::load("/nonexistent/trace.txt").unwrap_err();
    assert!(matches!(err, SimError::Io(_)));
}

#[test]
fn replay_runs_to_completion() {
    let mut rig = Rig::new(&flat(2, CoherenceProtocol::Mesi));
    let ops = trace::parse("0 W 0x100 2a\n1 R 0x100 1\n").unwrap();
    let ids = trace::replay(&mut rig.sim, &ops).unwrap();
    assert_eq!(ids.len(), 2);
    assert!(rig.sim.idle());
    rig.sim.check_coherence().unwrap();
    let done = rig.sim.drain_completions();
    assert_eq!(done.len(), 2);
    assert!(done.iter().any(|c| c.data() == Some(&[0x2A][..]) || c.data() == Some(&[0][..])));
}

/// Timed lines are issued at their time, untimed ones at the current time.
#[test]
fn replay_honours_issue_times() {
    let mut rig = Rig::new(&single_l1());
    let ops = trace::parse("@1000 0 R 0x0 1\n0 R 0x40 1\n@500 0 R 0x80 1\n").unwrap();
    let _ = trace::replay(&mut rig.sim, &ops).unwrap();
    let mut issued: Vec<_> = rig.sim.drain_completions().iter().map(|c| (c.addr, c.issued_at)).collect();
    issued.sort_unstable();
    assert_eq!(issued, vec![(0x0, 1_000), (0x40, 1_000), (0x80, 1_000)]);
}

#[test]
fn replay_stops_at_a_rejected_request() {
    let mut rig = Rig::new(&single_l1());
    let ops = trace::parse("0 R 0x0 1\n3 R 0x0 1\n").unwrap();
    let err = trace::replay(&mut rig.sim, &ops).unwrap_err();
    assert!(matches!(err, SimError::UnknownCore(3)));
}
