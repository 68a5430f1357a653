use super::command::{CommandType, EntityCommand};
use crate::state_machine::{EntityPayload, EntityState, StatefulEntity};
use chrono::{DateTime, Utc};

/// What a handler did to the entity it was given
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEffect {
    /// Entity was mutated and must be saved
    Modified,
    /// Entity already reflects the command; nothing to save
    AlreadyApplied,
    /// Command cannot apply to the entity in its current state
    Rejected(String),
}

/// Mutation applied to a leased entity outside the polling cycle.
///
/// Handlers never touch the store themselves; the registry leases, loads,
/// saves and publishes around [`CommandHandler::modify`]. State changes must
/// follow declared edges of the state graph.
pub trait CommandHandler<S: EntityState, P: EntityPayload>: Send + Sync {
    fn command_type(&self) -> CommandType;

    fn modify(
        &self,
        entity: &mut StatefulEntity<S, P>,
        command: &EntityCommand,
        now: DateTime<Utc>,
    ) -> CommandEffect;
}
