//! # System Constants
//!
//! Documented defaults and well-known names that define the operational
//! boundaries of the orchestration core.

/// Environment variable selecting the configuration environment
pub const ENVIRONMENT_ENV_VAR: &str = "DATASPACE_ENV";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV_VAR: &str = "DATASPACE_CONFIG_DIR";

/// Prefix for `DATASPACE__SECTION__FIELD` configuration overrides
pub const ENV_OVERRIDE_PREFIX: &str = "DATASPACE";

pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default numeric settings used when no configuration overrides them
pub mod defaults {
    pub const BATCH_SIZE: usize = 5;
    pub const ITERATION_WAIT_MS: u64 = 1_000;
    pub const MAX_ITERATION_WAIT_MS: u64 = 60_000;
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

    pub const MAX_RETRIES: u32 = 7;
    pub const BACKOFF_MIN_MS: u64 = 1_000;
    pub const BACKOFF_MAX_MS: u64 = 10_000;

    pub const LEASE_DURATION_MS: u64 = 60_000;

    pub const ASYNC_EVENT_BUFFER_SIZE: usize = 1_000;
    pub const FLOW_CACHE_CAPACITY: usize = 1_000;
}

/// Names of the entity kinds, used as manager names and log fields
pub mod kinds {
    pub const CONTRACT_NEGOTIATION: &str = "contract-negotiation";
    pub const TRANSFER_PROCESS: &str = "transfer-process";
    pub const POLICY_MONITOR: &str = "policy-monitor";
}

/// Message types exchanged with counter-party connectors
pub mod message_types {
    pub const CONTRACT_REQUEST: &str = "ContractRequestMessage";
    pub const CONTRACT_AGREEMENT_VERIFICATION: &str = "ContractAgreementVerificationMessage";
    pub const CONTRACT_NEGOTIATION_EVENT: &str = "ContractNegotiationEventMessage";
    pub const TRANSFER_START: &str = "TransferStartMessage";
}
