//! # Stateful Entity
//!
//! The unit of orchestration: a single generic record parameterized by the
//! kind's state enumeration and its business payload.

use super::errors::{TransitionError, TransitionResult};
use super::states::EntityState;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Business payload carried by an entity.
///
/// Payloads must serialize so stores can persist them and answer queries on
/// `payload.<path>` fields.
pub trait EntityPayload: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> EntityPayload for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Time-bounded ownership claim on an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner_id: String,
    pub leased_at: DateTime<Utc>,
    /// Lease duration in milliseconds
    pub lease_duration_ms: i64,
}

impl Lease {
    pub fn new(owner_id: impl Into<String>, leased_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            owner_id: owner_id.into(),
            leased_at,
            lease_duration_ms: duration.num_milliseconds(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.leased_at + Duration::milliseconds(self.lease_duration_ms)
    }

    /// Expired leases may be reclaimed by any owner
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn is_held_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// Generic stateful entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize, P: Serialize",
    deserialize = "S: Deserialize<'de>, P: Deserialize<'de>"
))]
pub struct StatefulEntity<S, P> {
    pub id: String,
    pub state: S,
    /// Last transition time. Retries push it forward to the instant the entity
    /// becomes due again.
    pub state_timestamp: DateTime<Utc>,
    /// Attempts made in the current state
    pub state_count: u32,
    pub error_detail: Option<String>,
    pub lease: Option<Lease>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: P,
}

impl<S: EntityState, P> StatefulEntity<S, P> {
    /// Create a new entity with a generated id
    pub fn new(state: S, payload: P, now: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), state, payload, now)
    }

    pub fn with_id(id: impl Into<String>, state: S, payload: P, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state,
            state_timestamp: now,
            state_count: 0,
            error_detail: None,
            lease: None,
            created_at: now,
            updated_at: now,
            payload,
        }
    }

    pub fn state_code(&self) -> i32 {
        self.state.code()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Due entities have waited out their dwell/backoff time
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state_timestamp <= now
    }

    /// Whether a live lease is held by somebody other than `owner_id`
    pub fn is_leased_by_other(&self, owner_id: &str, now: DateTime<Utc>) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|lease| !lease.is_held_by(owner_id) && !lease.is_expired(now))
    }

    /// Whether any live lease exists
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease.as_ref().is_some_and(|lease| !lease.is_expired(now))
    }

    pub fn clear_lease(&mut self) {
        self.lease = None;
    }

    /// Move along a declared edge of the state graph, resetting the attempt counter
    pub fn transition_to(&mut self, next: S, now: DateTime<Utc>) -> TransitionResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                entity_id: self.id.clone(),
                from: self.state.name().to_string(),
                to: next.name().to_string(),
            });
        }

        self.state = next;
        self.state_count = 0;
        self.error_detail = None;
        self.state_timestamp = now;
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed attempt in the current state and schedule the next one
    pub fn record_retry(&mut self, reason: impl Into<String>, due_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.state_count = self.state_count.saturating_add(1);
        self.error_detail = Some(reason.into());
        self.state_timestamp = due_at;
        self.updated_at = now;
    }

    /// Enter the kind's terminal failure state
    ///
    /// Entities already in a terminal state keep it and only record the reason.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        let failure = S::terminal_failure();
        if self.state.can_transition_to(failure) {
            self.state = failure;
            self.state_count = 0;
            self.state_timestamp = now;
        }
        self.error_detail = Some(reason.into());
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::states::TransferState;

    fn entity(now: DateTime<Utc>) -> StatefulEntity<TransferState, ()> {
        StatefulEntity::with_id("tp-1", TransferState::Initial, (), now)
    }

    #[test]
    fn test_lease_expiry() {
        let now = Utc::now();
        let lease = Lease::new("node-a", now, Duration::seconds(10));
        assert!(!lease.is_expired(now + Duration::seconds(9)));
        assert!(lease.is_expired(now + Duration::seconds(10)));
    }

    #[test]
    fn test_leased_by_other() {
        let now = Utc::now();
        let mut tp = entity(now);
        tp.lease = Some(Lease::new("node-a", now, Duration::seconds(10)));

        assert!(!tp.is_leased_by_other("node-a", now));
        assert!(tp.is_leased_by_other("node-b", now));
        assert!(!tp.is_leased_by_other("node-b", now + Duration::seconds(11)));
    }

    #[test]
    fn test_transition_resets_attempts() {
        let now = Utc::now();
        let mut tp = entity(now);
        tp.record_retry("timeout", now + Duration::seconds(1), now);
        assert_eq!(tp.state_count, 1);
        assert_eq!(tp.error_detail.as_deref(), Some("timeout"));
        assert!(!tp.is_due(now));

        let later = now + Duration::seconds(2);
        tp.transition_to(TransferState::Provisioning, later).unwrap();
        assert_eq!(tp.state, TransferState::Provisioning);
        assert_eq!(tp.state_count, 0);
        assert!(tp.error_detail.is_none());
        assert_eq!(tp.state_timestamp, later);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let now = Utc::now();
        let mut tp = entity(now);
        let err = tp.transition_to(TransferState::Completed, now).unwrap_err();
        assert!(err.to_string().contains("INITIAL"));
        assert_eq!(tp.state, TransferState::Initial);
    }

    #[test]
    fn test_fail_enters_terminal_failure() {
        let now = Utc::now();
        let mut tp = entity(now);
        tp.fail("provisioning refused", now);
        assert_eq!(tp.state, TransferState::Terminated);
        assert_eq!(tp.error_detail.as_deref(), Some("provisioning refused"));

        let mut done = entity(now);
        done.state = TransferState::Completed;
        done.fail("late failure", now);
        assert_eq!(done.state, TransferState::Completed);
    }
}
