//! # Line Geometry Tests
//!
//! Address splitting into line base, offset, set and tag.

use cachesim_core::common::LineGeometry;
use rstest::rstest;

#[rstest]
#[case(0)]
#[case(48)]
#[case(100)]
fn geometry_rejects_non_power_of_two(#[case] line: u64) {
    assert!(LineGeometry::new(line).is_none());
}

#[test]
fn base_and_offset() {
    let g = LineGeometry::new(64).unwrap();
    assert_eq!(g.base(0x1234), 0x1200);
    assert_eq!(g.offset(0x1234), 0x34);
    assert_eq!(g.line_index(0x1234), 0x48);
    assert_eq!(g.line_addr(0x48), 0x1200);
}

#[rstest]
#[case(0x38, 8, false)]
#[case(0x3C, 8, true)]
#[case(0x00, 64, false)]
#[case(0x01, 64, true)]
#[case(0x3F, 1, false)]
fn crossing_detection(#[case] addr: u64, #[case] size: usize, #[case] crosses: bool) {
    let g = LineGeometry::new(64).unwrap();
    assert_eq!(g.crosses(addr, size), crosses);
}

#[test]
fn tag_and_set_rebuild_the_line() {
    let g = LineGeometry::new(128).unwrap();
    for addr in [0u64, 0x80, 0x1000, 0xdead_beef, 10_000_000_000] {
        let set = g.set_index(addr, 32);
        let tag = g.tag(addr, 32);
        assert!(set < 32);
        assert_eq!(g.rebuild(tag, set, 32), g.base(addr));
    }
}

/// Lines 32 apart share a set in a 32-set cache.
#[test]
fn stride_of_sets_maps_to_same_set() {
    let g = LineGeometry::new(128).unwrap();
    let stride = 32 * 128;
    let sets: Vec<usize> = (0..9).map(|i| g.set_index(i * stride, 32)).collect();
    assert!(sets.iter().all(|&s| s == 0));
}
