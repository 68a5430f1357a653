//! # Connector Configuration
//!
//! Numeric settings consumed by the orchestration core: manager pacing,
//! retry bounds, lease duration, event buffering and the flow-completion cache.
//!
//! ## Architecture
//!
//! - **Layered Sources**: `base.toml`, then `<environment>.toml`, then `DATASPACE__*` variables
//! - **Environment Awareness**: `DATASPACE_ENV` selects development/test/production overrides
//! - **Explicit Validation**: Inconsistent values are rejected at load time
//! - **Documented Defaults**: Every section works with no file present
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dataspace_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let batch_size = manager.config().state_machine.batch_size;
//! let lease = manager.config().lease.duration();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub state_machine: StateMachineConfig,
    pub retry: RetryConfig,
    pub lease: LeaseConfig,
    pub events: EventsConfig,
    pub flow_cache: FlowCacheConfig,
}

/// Polling loop settings shared by every state machine manager
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StateMachineConfig {
    pub batch_size: usize,
    /// Base delay after an idle iteration
    pub iteration_wait_ms: u64,
    /// Cap for the exponential idle backoff
    pub max_iteration_wait_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            iteration_wait_ms: defaults::ITERATION_WAIT_MS,
            max_iteration_wait_ms: defaults::MAX_ITERATION_WAIT_MS,
            shutdown_timeout_ms: defaults::SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl StateMachineConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Bounds for re-attempting failed state processing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            backoff_min_ms: defaults::BACKOFF_MIN_MS,
            backoff_max_ms: defaults::BACKOFF_MAX_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub duration_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            duration_ms: defaults::LEASE_DURATION_MS,
        }
    }
}

impl LeaseConfig {
    /// Lease duration as used by entity stores
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.duration_ms).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the queue feeding asynchronous listeners
    pub async_buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: defaults::ASYNC_EVENT_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowCacheConfig {
    pub capacity: usize,
}

impl Default for FlowCacheConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::FLOW_CACHE_CAPACITY,
        }
    }
}

impl ConnectorConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let sm = &self.state_machine;

        if sm.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "state_machine.batch_size",
                sm.batch_size,
                "batch size must be greater than 0",
            ));
        }

        if sm.iteration_wait_ms > sm.max_iteration_wait_ms {
            return Err(ConfigurationError::invalid_value(
                "state_machine.iteration_wait_ms",
                sm.iteration_wait_ms,
                format!(
                    "must not exceed state_machine.max_iteration_wait_ms ({})",
                    sm.max_iteration_wait_ms
                ),
            ));
        }

        if self.retry.backoff_min_ms > self.retry.backoff_max_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.backoff_min_ms",
                self.retry.backoff_min_ms,
                format!(
                    "must not exceed retry.backoff_max_ms ({})",
                    self.retry.backoff_max_ms
                ),
            ));
        }

        if self.lease.duration_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "lease.duration_ms",
                self.lease.duration_ms,
                "lease duration must be greater than 0",
            ));
        }

        if self.events.async_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.async_buffer_size",
                self.events.async_buffer_size,
                "async listener buffer must hold at least one event",
            ));
        }

        if self.flow_cache.capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "flow_cache.capacity",
                self.flow_cache.capacity,
                "cache capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}
