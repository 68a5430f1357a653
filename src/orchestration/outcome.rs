use crate::dispatch::DispatchError;
use crate::state_machine::EntityState;
use std::fmt;

/// Result of processing an entity in its current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<S> {
    /// Move to the given state along a declared edge
    Advanced(S),
    /// Transient failure; try again after backoff if retries remain
    Retry(String),
    /// Permanent failure; enter the kind's terminal failure state
    Fatal(String),
}

impl<S: EntityState> Outcome<S> {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    /// Transient dispatch failures retry the transition, everything else is fatal
    pub fn from_dispatch_error(error: &DispatchError) -> Self {
        match error {
            DispatchError::Transient(_) => Self::Retry(error.to_string()),
            DispatchError::Fatal(_) | DispatchError::UnsupportedProtocol(_) => {
                Self::Fatal(error.to_string())
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Advanced(_) => "advanced",
            Self::Retry(_) => "retry",
            Self::Fatal(_) => "fatal",
        }
    }
}

impl<S: EntityState> fmt::Display for Outcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advanced(next) => write!(f, "advanced to {next}"),
            Self::Retry(reason) => write!(f, "retry: {reason}"),
            Self::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::TransferState;

    #[test]
    fn test_dispatch_error_mapping() {
        let transient: Outcome<TransferState> =
            Outcome::from_dispatch_error(&DispatchError::Transient("503".to_string()));
        assert_eq!(transient.label(), "retry");

        let fatal: Outcome<TransferState> =
            Outcome::from_dispatch_error(&DispatchError::UnsupportedProtocol("ftp".to_string()));
        assert!(matches!(fatal, Outcome::Fatal(ref reason) if reason.contains("ftp")));
    }
}
