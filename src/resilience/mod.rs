//! # Resilience Module
//!
//! Failure recovery for the orchestration loops.
//!
//! ## Architecture
//!
//! - **Wait Strategies**: Pace polling loops, backing off exponentially while a store is idle
//! - **Retry Policy**: Bound re-attempts of failed state processing with exponential backoff
//! - **Retry Listeners**: Observe scheduling, exhaustion and aborts
//!
//! Retries of the state transition live here. Retries of individual network
//! calls belong to the dispatch collaborators; the two layers compose.
//!
//! ## Usage
//!
//! ```rust
//! use dataspace_core::resilience::{RetryDecision, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(10));
//! assert_eq!(
//!     policy.decide("transfer-1", 0, "connection refused"),
//!     RetryDecision::RetryAfter(Duration::from_millis(500))
//! );
//! assert_eq!(policy.decide("transfer-1", 3, "connection refused"), RetryDecision::Exhausted);
//! ```

pub mod retry_policy;
pub mod wait_strategy;

pub use retry_policy::{RetryDecision, RetryListener, RetryPolicy};
pub use wait_strategy::{ExponentialWaitStrategy, FixedWaitStrategy, WaitStrategy};
