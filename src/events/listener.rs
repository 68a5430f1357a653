use super::types::{EntityEvent, Event};
use crate::state_machine::{EntityPayload, EntityState};
use async_trait::async_trait;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::info;

/// Errors raised by event listeners
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListenerError {
    #[error("Listener {listener} rejected event {event_id}: {reason}")]
    Rejected {
        listener: String,
        event_id: String,
        reason: String,
    },

    #[error("Listener failure: {0}")]
    Failed(String),
}

impl ListenerError {
    pub fn rejected(
        listener: impl Into<String>,
        event_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            listener: listener.into(),
            event_id: event_id.into(),
            reason: reason.into(),
        }
    }
}

pub type ListenerResult<T> = Result<T, ListenerError>;

/// Receiver of entity lifecycle notifications.
///
/// Every callback defaults to a no-op so listeners only implement what they
/// care about. The same trait serves synchronous and asynchronous
/// registration; only the delivery path differs.
#[async_trait]
pub trait EntityListener<S: EntityState, P: EntityPayload>: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn created(&self, _event: &Event<S, P>) -> ListenerResult<()> {
        Ok(())
    }

    async fn transitioned(&self, _event: &Event<S, P>) -> ListenerResult<()> {
        Ok(())
    }

    async fn deleted(&self, _event: &Event<S, P>) -> ListenerResult<()> {
        Ok(())
    }
}

/// Route an event to the callback matching its type
pub(crate) async fn deliver<S, P>(
    listener: &dyn EntityListener<S, P>,
    event: &Event<S, P>,
) -> ListenerResult<()>
where
    S: EntityState,
    P: EntityPayload,
{
    match &event.payload {
        EntityEvent::Created { .. } => listener.created(event).await,
        EntityEvent::Transitioned { .. } => listener.transitioned(event).await,
        EntityEvent::Deleted { .. } => listener.deleted(event).await,
    }
}

/// Emits one structured log line per event
#[derive(Debug)]
pub struct LoggingListener<S, P> {
    kind: String,
    _marker: PhantomData<fn() -> (S, P)>,
}

impl<S, P> LoggingListener<S, P> {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<S: EntityState, P: EntityPayload> EntityListener<S, P> for LoggingListener<S, P> {
    fn name(&self) -> &str {
        "logging"
    }

    async fn created(&self, event: &Event<S, P>) -> ListenerResult<()> {
        let entity = event.payload.entity();
        info!(kind = %self.kind, entity_id = %entity.id, state = %entity.state, "Entity created");
        Ok(())
    }

    async fn transitioned(&self, event: &Event<S, P>) -> ListenerResult<()> {
        if let EntityEvent::Transitioned { from, entity } = &event.payload {
            info!(
                kind = %self.kind,
                entity_id = %entity.id,
                from = %from,
                to = %entity.state,
                error_detail = entity.error_detail.as_deref(),
                "Entity transitioned"
            );
        }
        Ok(())
    }

    async fn deleted(&self, event: &Event<S, P>) -> ListenerResult<()> {
        info!(kind = %self.kind, entity_id = %event.entity_id(), "Entity deleted");
        Ok(())
    }
}
