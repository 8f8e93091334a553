//! MESI state predicates.

use cachesim_core::core::units::coherence::{Grant, MesiState, Want};
use rstest::rstest;

#[rstest]
#[case(MesiState::Modified, true, true, true, 'M')]
#[case(MesiState::Exclusive, true, true, false, 'E')]
#[case(MesiState::Shared, true, false, false, 'S')]
#[case(MesiState::Invalid, false, false, false, 'I')]
fn predicates(
    #[case] state: MesiState,
    #[case] valid: bool,
    #[case] writable: bool,
    #[case] dirty: bool,
    #[case] letter: char,
) {
    assert_eq!(state.is_valid(), valid);
    assert_eq!(state.can_write(), writable);
    assert_eq!(state.is_dirty(), dirty);
    assert_eq!(state.letter(), letter);
    assert_eq!(state.satisfies(Want::Shared), valid);
    assert_eq!(state.satisfies(Want::Exclusive), writable);
}

#[test]
fn default_is_invalid() {
    assert_eq!(MesiState::default(), MesiState::Invalid);
}

#[test]
fn grants_map_to_states() {
    assert_eq!(Grant::Shared.state(), MesiState::Shared);
    assert_eq!(Grant::Exclusive.state(), MesiState::Exclusive);
    assert_eq!(Grant::Modified.state(), MesiState::Modified);
}
