//! # Retry Policy
//!
//! Decides per entity whether a failed processing attempt is retried, how long
//! the entity backs off before it becomes due again, and when to give up.
//!
//! Backoff for the next due-check is `min(backoff_max, backoff_min * 2^state_count)`
//! where `state_count` is the number of attempts already recorded in the
//! current state. The manager persists it by pushing the entity's
//! `state_timestamp` forward, so the store's due predicate enforces it.

use crate::config::RetryConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Observer hooks fired around retry decisions
///
/// All hooks default to no-ops.
pub trait RetryListener: Send + Sync {
    /// A retry was scheduled to run after `delay`
    fn on_scheduled(&self, _entity_id: &str, _attempt: u32, _delay: Duration) {}

    /// A previously failed entity is being processed again
    fn on_retry(&self, _entity_id: &str, _attempt: u32) {}

    /// No retries remain; the entity is moved to its terminal failure state
    fn on_retries_exceeded(&self, _entity_id: &str, _attempts: u32, _reason: &str) {}

    /// A single attempt failed
    fn on_failed(&self, _entity_id: &str, _attempt: u32, _reason: &str) {}

    /// Processing reported a non-retryable failure
    fn on_abort(&self, _entity_id: &str, _reason: &str) {}
}

/// Outcome of consulting the policy after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry once the delay has elapsed
    RetryAfter(Duration),
    /// Retries exhausted
    Exhausted,
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_min: Duration,
    backoff_max: Duration,
    listeners: Vec<Arc<dyn RetryListener>>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff_min", &self.backoff_min)
            .field("backoff_max", &self.backoff_max)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            max_retries,
            backoff_min,
            backoff_max: backoff_max.max(backoff_min),
            listeners: Vec::new(),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.backoff_min_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Policy that never retries
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Policy for states that re-check an external condition indefinitely
    pub fn unbounded(backoff_min: Duration, backoff_max: Duration) -> Self {
        Self::new(u32::MAX, backoff_min, backoff_max)
    }

    pub fn with_listener(mut self, listener: Arc<dyn RetryListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn should_retry(&self, state_count: u32) -> bool {
        state_count < self.max_retries
    }

    pub fn backoff_delay(&self, state_count: u32) -> Duration {
        let factor = 1u32.checked_shl(state_count.min(31)).unwrap_or(u32::MAX);
        self.backoff_min
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Decide what happens after a failed attempt, firing the matching hooks
    pub fn decide(&self, entity_id: &str, state_count: u32, reason: &str) -> RetryDecision {
        self.listeners
            .iter()
            .for_each(|l| l.on_failed(entity_id, state_count, reason));

        if self.should_retry(state_count) {
            let delay = self.backoff_delay(state_count);
            debug!(
                entity_id = %entity_id,
                attempt = state_count + 1,
                delay_ms = delay.as_millis() as u64,
                "Scheduling retry"
            );
            self.listeners
                .iter()
                .for_each(|l| l.on_scheduled(entity_id, state_count + 1, delay));
            RetryDecision::RetryAfter(delay)
        } else {
            self.listeners
                .iter()
                .for_each(|l| l.on_retries_exceeded(entity_id, state_count, reason));
            RetryDecision::Exhausted
        }
    }

    /// Fire the retry hook before re-processing an entity with recorded failures
    pub fn notify_retry(&self, entity_id: &str, state_count: u32) {
        if state_count > 0 {
            self.listeners
                .iter()
                .for_each(|l| l.on_retry(entity_id, state_count));
        }
    }

    pub fn notify_abort(&self, entity_id: &str, reason: &str) {
        self.listeners.iter().for_each(|l| l.on_abort(entity_id, reason));
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        calls: Mutex<Vec<String>>,
    }

    impl RetryListener for RecordingListener {
        fn on_scheduled(&self, entity_id: &str, attempt: u32, delay: Duration) {
            self.calls
                .lock()
                .push(format!("scheduled:{entity_id}:{attempt}:{}", delay.as_millis()));
        }

        fn on_retries_exceeded(&self, entity_id: &str, attempts: u32, _reason: &str) {
            self.calls.lock().push(format!("exceeded:{entity_id}:{attempts}"));
        }

        fn on_failed(&self, entity_id: &str, attempt: u32, reason: &str) {
            self.calls.lock().push(format!("failed:{entity_id}:{attempt}:{reason}"));
        }
    }

    #[test]
    fn test_should_retry_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retries().should_retry(0));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(1));
    }

    #[test]
    fn test_decide_fires_hooks() {
        let listener = Arc::new(RecordingListener::default());
        let policy = RetryPolicy::new(1, Duration::from_millis(5), Duration::from_millis(50))
            .with_listener(listener.clone());

        assert_eq!(
            policy.decide("cn-1", 0, "timeout"),
            RetryDecision::RetryAfter(Duration::from_millis(5))
        );
        assert_eq!(policy.decide("cn-1", 1, "timeout"), RetryDecision::Exhausted);

        let calls = listener.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                "failed:cn-1:0:timeout".to_string(),
                "scheduled:cn-1:1:5".to_string(),
                "failed:cn-1:1:timeout".to_string(),
                "exceeded:cn-1:1".to_string(),
            ]
        );
    }
}
