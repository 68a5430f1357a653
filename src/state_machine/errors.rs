use thiserror::Error;

/// Errors raised while moving an entity through its state graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Invalid state transition for {entity_id}: {from} -> {to}")]
    InvalidTransition {
        entity_id: String,
        from: String,
        to: String,
    },

    #[error("Unknown state code {code} for {kind}")]
    UnknownStateCode { kind: String, code: i32 },
}

pub type TransitionResult<T> = Result<T, TransitionError>;
