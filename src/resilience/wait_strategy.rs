//! # Wait Strategies
//!
//! Pacing for state machine polling loops. A loop that found work polls again
//! immediately; a loop that came back empty (or failed) asks its wait strategy
//! how long to sleep.

use crate::config::StateMachineConfig;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Computes the delay before the next polling iteration
pub trait WaitStrategy: Send + Sync + Debug {
    /// Delay before the next iteration
    fn wait_for_millis(&self) -> u64;

    /// The previous iteration made progress
    fn success(&self);

    /// Record `count` consecutive empty or failed iterations
    fn failures(&self, count: u32);

    fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_for_millis())
    }
}

/// Exponential idle backoff: `base * 2^failures`, capped at `max`
#[derive(Debug)]
pub struct ExponentialWaitStrategy {
    base_ms: u64,
    max_ms: u64,
    consecutive_failures: AtomicU32,
}

impl ExponentialWaitStrategy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn from_config(config: &StateMachineConfig) -> Self {
        Self::new(config.iteration_wait_ms, config.max_iteration_wait_ms)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }
}

impl WaitStrategy for ExponentialWaitStrategy {
    fn wait_for_millis(&self) -> u64 {
        let failures = self.consecutive_failures();
        // 2^63 already exceeds any sensible cap
        let factor = 1u64.checked_shl(failures.min(63)).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }

    fn success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    fn failures(&self, count: u32) {
        let _ = self
            .consecutive_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(count))
            });
    }
}

/// Constant delay regardless of outcome
#[derive(Debug, Clone, Copy)]
pub struct FixedWaitStrategy {
    wait_ms: u64,
}

impl FixedWaitStrategy {
    pub fn new(wait_ms: u64) -> Self {
        Self { wait_ms }
    }
}

impl WaitStrategy for FixedWaitStrategy {
    fn wait_for_millis(&self) -> u64 {
        self.wait_ms
    }

    fn success(&self) {}

    fn failures(&self, _count: u32) {}
}
