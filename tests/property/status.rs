use proptest::prelude::*;
use procjournal::types::ProcessStatus;

fn status_strategy() -> impl Strategy<Value = ProcessStatus> {
    proptest::sample::select(ProcessStatus::ALL.to_vec())
}

#[test]
fn terminal_states_have_no_outgoing_edges() {
    for from in ProcessStatus::ALL.iter().filter(|s| s.is_terminal()) {
        for to in ProcessStatus::ALL {
            assert!(!from.can_transition_to(to), "{from} -> {to}");
        }
    }
}

#[test]
fn every_live_state_can_reach_a_terminal_one() {
    for start in ProcessStatus::ALL {
        let mut current = start;
        while !current.is_terminal() {
            current = ProcessStatus::ALL
                .into_iter()
                .find(|next| current.can_transition_to(*next))
                .unwrap_or_else(|| panic!("{current} is stuck"));
        }
    }
}

proptest! {
    // Replaying any sequence of requested transitions, applying only the
    // legal ones, never moves backwards.
    #[test]
    fn legal_transitions_only_move_forward(
        requests in proptest::collection::vec(status_strategy(), 0..32),
    ) {
        let mut current = ProcessStatus::Unstarted;
        for next in requests {
            if current.can_transition_to(next) {
                prop_assert!(next.as_u8() > current.as_u8());
                prop_assert!(!current.is_terminal());
                current = next;
            }
        }
        prop_assert_eq!(ProcessStatus::from_u8(current.as_u8()), Some(current));
    }
}
