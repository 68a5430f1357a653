//! Built-in command handlers for cancellation and deprovisioning.

use super::command::{CommandType, EntityCommand};
use super::handler::{CommandEffect, CommandHandler};
use crate::state_machine::{
    EntityPayload, EntityState, NegotiationState, StatefulEntity, TransferState,
};
use chrono::{DateTime, Utc};

const DEFAULT_CANCEL_REASON: &str = "Cancelled by command";

/// Move a non-terminal entity to `terminated`.
///
/// Every terminal state rejects the command, `terminated` itself included, so a
/// repeated cancel is a no-op reported as not executable.
fn cancel<S: EntityState, P: EntityPayload>(
    entity: &mut StatefulEntity<S, P>,
    terminated: S,
    command: &EntityCommand,
    now: DateTime<Utc>,
) -> CommandEffect {
    if entity.is_terminal() {
        return CommandEffect::Rejected(format!(
            "Entity {} is in terminal state {}",
            entity.id, entity.state
        ));
    }

    match entity.transition_to(terminated, now) {
        Ok(()) => {
            entity.error_detail = Some(command.reason().unwrap_or(DEFAULT_CANCEL_REASON).to_string());
            CommandEffect::Modified
        }
        Err(e) => CommandEffect::Rejected(e.to_string()),
    }
}

/// Terminates a contract negotiation
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelNegotiationHandler;

impl<P: EntityPayload> CommandHandler<NegotiationState, P> for CancelNegotiationHandler {
    fn command_type(&self) -> CommandType {
        CommandType::Cancel
    }

    fn modify(
        &self,
        entity: &mut StatefulEntity<NegotiationState, P>,
        command: &EntityCommand,
        now: DateTime<Utc>,
    ) -> CommandEffect {
        cancel(entity, NegotiationState::Terminated, command, now)
    }
}

/// Terminates a transfer process
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelTransferHandler;

impl<P: EntityPayload> CommandHandler<TransferState, P> for CancelTransferHandler {
    fn command_type(&self) -> CommandType {
        CommandType::Cancel
    }

    fn modify(
        &self,
        entity: &mut StatefulEntity<TransferState, P>,
        command: &EntityCommand,
        now: DateTime<Utc>,
    ) -> CommandEffect {
        cancel(entity, TransferState::Terminated, command, now)
    }
}

/// Releases provisioned resources of a completed or terminated transfer
#[derive(Debug, Default, Clone, Copy)]
pub struct DeprovisionTransferHandler;

impl<P: EntityPayload> CommandHandler<TransferState, P> for DeprovisionTransferHandler {
    fn command_type(&self) -> CommandType {
        CommandType::Deprovision
    }

    fn modify(
        &self,
        entity: &mut StatefulEntity<TransferState, P>,
        _command: &EntityCommand,
        now: DateTime<Utc>,
    ) -> CommandEffect {
        match entity.state {
            TransferState::Deprovisioning | TransferState::Deprovisioned => {
                CommandEffect::AlreadyApplied
            }
            TransferState::Completed | TransferState::Terminated => {
                match entity.transition_to(TransferState::Deprovisioning, now) {
                    Ok(()) => CommandEffect::Modified,
                    Err(e) => CommandEffect::Rejected(e.to_string()),
                }
            }
            other => CommandEffect::Rejected(format!(
                "Transfer process {} cannot be deprovisioned from state {}",
                entity.id, other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(state: TransferState) -> StatefulEntity<TransferState, ()> {
        StatefulEntity::with_id("tp-1", state, (), Utc::now())
    }

    #[test]
    fn test_cancel_transfer_outcomes() {
        let handler = CancelTransferHandler;
        let command = EntityCommand::cancel("tp-1", "user abort");

        let mut started = transfer(TransferState::Started);
        assert_eq!(handler.modify(&mut started, &command, Utc::now()), CommandEffect::Modified);
        assert_eq!(started.state, TransferState::Terminated);
        assert_eq!(started.error_detail.as_deref(), Some("user abort"));

        // A second cancel finds a terminal state and leaves it untouched
        assert!(matches!(
            handler.modify(&mut started, &command, Utc::now()),
            CommandEffect::Rejected(ref reason) if reason.contains("terminal state TERMINATED")
        ));
        assert_eq!(started.error_detail.as_deref(), Some("user abort"));

        let mut completed = transfer(TransferState::Completed);
        assert!(matches!(
            handler.modify(&mut completed, &command, Utc::now()),
            CommandEffect::Rejected(_)
        ));
        assert_eq!(completed.state, TransferState::Completed);
    }

    #[test]
    fn test_cancel_negotiation_rejects_finalized() {
        let handler = CancelNegotiationHandler;
        let command = EntityCommand::cancel("cn-1", "withdrawn");
        let mut finalized: StatefulEntity<NegotiationState, ()> =
            StatefulEntity::with_id("cn-1", NegotiationState::Finalized, (), Utc::now());
        assert!(matches!(
            handler.modify(&mut finalized, &command, Utc::now()),
            CommandEffect::Rejected(_)
        ));
    }

    #[test]
    fn test_deprovision_transitions() {
        let handler = DeprovisionTransferHandler;
        let command = EntityCommand::deprovision("tp-1");

        let mut terminated = transfer(TransferState::Terminated);
        assert_eq!(handler.modify(&mut terminated, &command, Utc::now()), CommandEffect::Modified);
        assert_eq!(terminated.state, TransferState::Deprovisioning);
        assert_eq!(
            handler.modify(&mut terminated, &command, Utc::now()),
            CommandEffect::AlreadyApplied
        );

        let mut initial = transfer(TransferState::Initial);
        assert!(matches!(
            handler.modify(&mut initial, &command, Utc::now()),
            CommandEffect::Rejected(_)
        ));
    }
}
