//! Error types for the dataspace orchestration core.
//!

use crate::commands::CommandError;
use crate::config::ConfigurationError;
use crate::dispatch::DispatchError;
use crate::events::ListenerError;
use crate::state_machine::errors::TransitionError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("State transition error: {0}")]
    StateTransition(#[from] TransitionError),
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Timeout error: {0}")]
    Timeout(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        CoreError::Internal(format!("JSON serialization error: {error}"))
    }
}

impl CoreError {
    /// Lease conflicts are an expected outcome of concurrent managers, not a failure
    pub fn is_lease_conflict(&self) -> bool {
        matches!(self, CoreError::Store(StoreError::LeaseConflict { .. }))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_conflict_detection() {
        let err: CoreError = StoreError::LeaseConflict {
            entity_id: "tp-1".to_string(),
            owner_id: "node-b".to_string(),
        }
        .into();
        assert!(err.is_lease_conflict());

        let err: CoreError = StoreError::NotFound {
            entity_id: "tp-1".to_string(),
        }
        .into();
        assert!(!err.is_lease_conflict());
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::Timeout("manager stop".to_string());
        assert_eq!(err.to_string(), "Timeout error: manager stop");
    }
}
