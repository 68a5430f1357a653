//! # Command Handler Registry
//!
//! Central command routing for one entity kind. Each command type maps to
//! exactly one handler. Execution follows the same leasing discipline as the
//! polling loop: lease the target, load it, let the handler modify it, write it
//! back through the fenced [`EntityStore::release`], then publish the resulting
//! event.
//!
//! Each execution leases under its own owner id (`<store owner>:cmd:<command
//! id>`), never the store handle's owner id. A manager sharing that store handle
//! therefore conflicts with the command instead of having its lease silently
//! renewed, and a command and the polling loop are mutually exclusive on any
//! entity through the lease alone.

use super::command::{CommandResult, CommandType, EntityCommand};
use super::handler::{CommandEffect, CommandHandler};
use super::CommandError;
use crate::clock::{Clock, SystemClock};
use crate::events::{Event, Observable};
use crate::state_machine::{EntityPayload, EntityState, StatefulEntity};
use crate::store::{EntityStore, StoreError};
use chrono::Duration;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct CommandHandlerRegistry<S: EntityState, P: EntityPayload> {
    handlers: DashMap<CommandType, Arc<dyn CommandHandler<S, P>>>,
    store: Arc<dyn EntityStore<S, P>>,
    observable: Observable<S, P>,
    clock: Arc<dyn Clock>,
    lease_duration: Duration,
}

impl<S: EntityState, P: EntityPayload> CommandHandlerRegistry<S, P> {
    pub fn new(
        store: Arc<dyn EntityStore<S, P>>,
        observable: Observable<S, P>,
        lease_duration: Duration,
    ) -> Self {
        Self::with_clock(store, observable, lease_duration, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn EntityStore<S, P>>,
        observable: Observable<S, P>,
        lease_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            handlers: DashMap::new(),
            store,
            observable,
            clock,
            lease_duration,
        }
    }

    /// Register the handler for its command type
    pub fn register(&self, handler: Arc<dyn CommandHandler<S, P>>) -> Result<(), CommandError> {
        let command_type = handler.command_type();
        match self.handlers.entry(command_type.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CommandError::DuplicateHandler { command_type })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handler);
                info!(command_type = %command_type, "Registered command handler");
                Ok(())
            }
        }
    }

    pub fn unregister(&self, command_type: &CommandType) -> bool {
        self.handlers.remove(command_type).is_some()
    }

    pub fn is_registered(&self, command_type: &CommandType) -> bool {
        self.handlers.contains_key(command_type)
    }

    /// Execute a command against its target entity.
    ///
    /// Unregistered types, missing targets and targets leased by someone else
    /// yield [`CommandResult::NotExecutable`]. Only store failures and
    /// synchronous-listener failures are returned as errors.
    #[instrument(skip(self, command), fields(
        command_id = %command.command_id,
        command_type = %command.command_type,
        entity_id = %command.target_entity_id
    ))]
    pub async fn execute(&self, command: &EntityCommand) -> Result<CommandResult, CommandError> {
        let Some(handler) = self
            .handlers
            .get(&command.command_type)
            .map(|entry| Arc::clone(entry.value()))
        else {
            warn!("No handler registered for command type");
            return Ok(CommandResult::not_executable(format!(
                "No handler registered for command type {}",
                command.command_type
            )));
        };

        let entity_id = command.target_entity_id.as_str();
        let owner_id = command_owner_id(self.store.owner_id(), command);

        match self
            .store
            .lease_entity(entity_id, &owner_id, self.lease_duration)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                return Ok(CommandResult::not_executable(format!(
                    "Entity {entity_id} not found"
                )));
            }
            Err(StoreError::LeaseConflict { owner_id, .. }) => {
                debug!(holder = %owner_id, "Command target is leased by another owner");
                return Ok(CommandResult::not_executable(format!(
                    "Entity {entity_id} is currently leased by {owner_id}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let Some(original) = self.store.find(entity_id).await? else {
            return Ok(CommandResult::not_executable(format!(
                "Entity {entity_id} not found"
            )));
        };

        let now = self.clock.now();
        let mut entity = original.clone();
        let effect = handler.modify(&mut entity, command, now);

        match effect {
            CommandEffect::Modified
                if original.state != entity.state
                    && !original.state.can_transition_to(entity.state) =>
            {
                let reason = format!(
                    "Command {} attempted undeclared transition {} -> {}",
                    command.command_type, original.state, entity.state
                );
                self.release(original).await?;
                Ok(CommandResult::not_executable(reason))
            }
            CommandEffect::Modified => {
                entity.lease = original.lease.clone();
                entity.updated_at = now;
                self.store.release(&entity).await?;
                entity.clear_lease();
                info!(
                    from = %original.state,
                    to = %entity.state,
                    "Command executed"
                );

                if original.state != entity.state {
                    self.observable
                        .publish(Event::transitioned(original.state, entity, now))
                        .await?;
                }
                Ok(CommandResult::Executed)
            }
            CommandEffect::AlreadyApplied => {
                debug!(state = %original.state, "Command already applied");
                self.release(original).await?;
                Ok(CommandResult::Executed)
            }
            CommandEffect::Rejected(reason) => {
                debug!(state = %original.state, reason = %reason, "Command rejected by handler");
                self.release(original).await?;
                Ok(CommandResult::not_executable(reason))
            }
        }
    }

    async fn release(&self, entity: StatefulEntity<S, P>) -> Result<(), CommandError> {
        self.store.release(&entity).await?;
        Ok(())
    }
}

/// Lease identity of one command execution
fn command_owner_id(store_owner_id: &str, command: &EntityCommand) -> String {
    format!("{store_owner_id}:cmd:{}", command.command_id)
}

impl<S: EntityState, P: EntityPayload> std::fmt::Debug for CommandHandlerRegistry<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandlerRegistry")
            .field("handlers", &self.handlers.len())
            .field("owner_id", &self.store.owner_id())
            .finish()
    }
}
