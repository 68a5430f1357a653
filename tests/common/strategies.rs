//! Proptest strategies for state graphs and retry settings.

use dataspace_core::state_machine::{EntityState, NegotiationState, PolicyMonitorState, TransferState};
use proptest::prelude::*;
use std::time::Duration;

pub fn transfer_state_strategy() -> impl Strategy<Value = TransferState> {
    prop::sample::select(TransferState::all().to_vec())
}

pub fn negotiation_state_strategy() -> impl Strategy<Value = NegotiationState> {
    prop::sample::select(NegotiationState::all().to_vec())
}

pub fn policy_monitor_state_strategy() -> impl Strategy<Value = PolicyMonitorState> {
    prop::sample::select(PolicyMonitorState::all().to_vec())
}

/// `(max_retries, backoff_min, backoff_max)` with `backoff_min <= backoff_max`
pub fn retry_settings_strategy() -> impl Strategy<Value = (u32, Duration, Duration)> {
    (0u32..20, 1u64..5_000, 0u64..120_000).prop_map(|(max_retries, min_ms, extra_ms)| {
        (
            max_retries,
            Duration::from_millis(min_ms),
            Duration::from_millis(min_ms + extra_ms),
        )
    })
}

/// Random walk of processor outcomes: `true` advances, `false` retries
pub fn outcome_walk_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..40)
}
