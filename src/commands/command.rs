//! Out-of-band commands targeting a single entity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Command types for all supported entity operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Cancel,
    Deprovision,
    Custom(String),
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => write!(f, "cancel"),
            Self::Deprovision => write!(f, "deprovision"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Transient command value, never persisted as its own entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCommand {
    /// Unique identifier for this command
    pub command_id: String,
    pub command_type: CommandType,
    pub target_entity_id: String,
    pub payload: Value,
}

impl EntityCommand {
    /// Create a new command with generated ID and empty payload
    pub fn new(command_type: CommandType, target_entity_id: impl Into<String>) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            command_type,
            target_entity_id: target_entity_id.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn cancel(target_entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(CommandType::Cancel, target_entity_id)
            .with_payload(serde_json::json!({ "reason": reason.into() }))
    }

    pub fn deprovision(target_entity_id: impl Into<String>) -> Self {
        Self::new(CommandType::Deprovision, target_entity_id)
    }

    /// Human-readable reason carried in the payload, if any
    pub fn reason(&self) -> Option<&str> {
        self.payload.get("reason").and_then(Value::as_str)
    }
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResult {
    /// The command took effect, or the entity was already in the post-command state
    Executed,
    NotExecutable { reason: String },
}

impl CommandResult {
    pub fn not_executable(reason: impl Into<String>) -> Self {
        Self::NotExecutable {
            reason: reason.into(),
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Executed => None,
            Self::NotExecutable { reason } => Some(reason),
        }
    }
}
