mod common;

use common::strategies::*;
use dataspace_core::resilience::{RetryDecision, RetryPolicy};
use dataspace_core::state_machine::{EntityState, NegotiationState, PolicyMonitorState, StatefulEntity, TransferState};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    /// Property: Backoff never decreases with attempts and never exceeds the cap
    #[test]
    fn backoff_is_monotonic_and_capped((max_retries, min, max) in retry_settings_strategy()) {
        let policy = RetryPolicy::new(max_retries, min, max);
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = policy.backoff_delay(attempt);
            prop_assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            prop_assert!(delay <= max);
            prop_assert!(delay >= min.min(max));
            previous = delay;
        }
    }

    /// Property: A policy grants exactly `max_retries` retries before exhausting
    #[test]
    fn retries_are_bounded((max_retries, min, max) in retry_settings_strategy()) {
        let policy = RetryPolicy::new(max_retries, min, max);
        let granted = (0..max_retries + 5)
            .take_while(|count| matches!(policy.decide("tp-1", *count, "timeout"), RetryDecision::RetryAfter(_)))
            .count();
        prop_assert_eq!(granted, max_retries as usize);
        prop_assert_eq!(policy.decide("tp-1", max_retries, "timeout"), RetryDecision::Exhausted);
    }

    /// Property: Terminal states have no outgoing edges and codes decode back to their state
    #[test]
    fn terminal_states_absorb(from in transfer_state_strategy(), to in transfer_state_strategy()) {
        if from.is_terminal() && to == TransferState::Terminated {
            prop_assert!(!from.can_transition_to(to));
        }
        prop_assert_eq!(TransferState::from_code(from.code()), Some(from));
        prop_assert!(!from.can_transition_to(from), "self-transitions are never declared");
    }

    /// Property: Every non-terminal negotiation can be cancelled, terminal ones cannot
    #[test]
    fn negotiation_cancellation_edges(state in negotiation_state_strategy()) {
        prop_assert_eq!(
            state.can_transition_to(NegotiationState::terminal_failure()),
            !state.is_terminal()
        );
    }

    /// Property: Policy monitor entries only ever leave STARTED
    #[test]
    fn policy_monitor_edges(from in policy_monitor_state_strategy(), to in policy_monitor_state_strategy()) {
        if from.can_transition_to(to) {
            prop_assert_eq!(from, PolicyMonitorState::Started);
            prop_assert!(to.is_terminal());
        }
    }

    /// Property: Retries only grow the attempt counter, a transition always resets it
    #[test]
    fn attempt_counter_tracks_current_state(walk in outcome_walk_strategy()) {
        let now = chrono::Utc::now();
        let mut entity = StatefulEntity::with_id("tp-1", TransferState::Initial, (), now);
        let path = [TransferState::Provisioning, TransferState::Started, TransferState::Completed];
        let mut next = path.iter();
        let mut expected_count = 0;

        for advance in walk {
            if advance {
                if let Some(target) = next.next() {
                    entity.transition_to(*target, now).unwrap();
                    expected_count = 0;
                    continue;
                }
            }
            entity.record_retry("busy", now, now);
            expected_count += 1;
            prop_assert_eq!(entity.state_count, expected_count);
        }
        prop_assert_eq!(entity.state_count, expected_count);
    }
}
