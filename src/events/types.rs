use crate::state_machine::{EntityPayload, EntityState, StatefulEntity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to an entity, with a snapshot taken after the change was saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(bound(
    serialize = "S: Serialize, P: Serialize",
    deserialize = "S: Deserialize<'de>, P: Deserialize<'de>"
))]
pub enum EntityEvent<S, P> {
    Created { entity: StatefulEntity<S, P> },
    Transitioned { from: S, entity: StatefulEntity<S, P> },
    Deleted { entity: StatefulEntity<S, P> },
}

impl<S, P> EntityEvent<S, P> {
    pub fn entity(&self) -> &StatefulEntity<S, P> {
        match self {
            Self::Created { entity } | Self::Transitioned { entity, .. } | Self::Deleted { entity } => entity,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Transitioned { .. } => "transitioned",
            Self::Deleted { .. } => "deleted",
        }
    }
}

/// Notification emitted after a state change is durably persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize, P: Serialize",
    deserialize = "S: Deserialize<'de>, P: Deserialize<'de>"
))]
pub struct Event<S, P> {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: EntityEvent<S, P>,
}

impl<S: EntityState, P: EntityPayload> Event<S, P> {
    pub fn new(payload: EntityEvent<S, P>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            occurred_at,
            payload,
        }
    }

    pub fn created(entity: StatefulEntity<S, P>, occurred_at: DateTime<Utc>) -> Self {
        Self::new(EntityEvent::Created { entity }, occurred_at)
    }

    pub fn transitioned(from: S, entity: StatefulEntity<S, P>, occurred_at: DateTime<Utc>) -> Self {
        Self::new(EntityEvent::Transitioned { from, entity }, occurred_at)
    }

    pub fn deleted(entity: StatefulEntity<S, P>, occurred_at: DateTime<Utc>) -> Self {
        Self::new(EntityEvent::Deleted { entity }, occurred_at)
    }

    pub fn entity_id(&self) -> &str {
        &self.payload.entity().id
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}
