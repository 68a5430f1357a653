use super::outcome::Outcome;
use crate::state_machine::{EntityPayload, EntityState, StatefulEntity};
use async_trait::async_trait;
use std::marker::PhantomData;

/// Processing logic for entities in one state.
///
/// The entity is a working copy leased to the calling manager. Payload changes
/// are persisted together with the outcome; on `Err` or panic they are
/// discarded and the attempt counts as a retry. Processors may run more than
/// once for the same state after a crash, so side effects must be idempotent.
#[async_trait]
pub trait StateProcessor<S: EntityState, P: EntityPayload>: Send + Sync {
    async fn process(&self, entity: &mut StatefulEntity<S, P>) -> anyhow::Result<Outcome<S>>;
}

/// Adapter turning a synchronous closure into a [`StateProcessor`]
pub struct FnProcessor<S, P, F> {
    f: F,
    _marker: PhantomData<fn() -> (S, P)>,
}

#[async_trait]
impl<S, P, F> StateProcessor<S, P> for FnProcessor<S, P, F>
where
    S: EntityState,
    P: EntityPayload,
    F: Fn(&mut StatefulEntity<S, P>) -> anyhow::Result<Outcome<S>> + Send + Sync,
{
    async fn process(&self, entity: &mut StatefulEntity<S, P>) -> anyhow::Result<Outcome<S>> {
        (self.f)(entity)
    }
}

pub fn from_fn<S, P, F>(f: F) -> FnProcessor<S, P, F>
where
    S: EntityState,
    P: EntityPayload,
    F: Fn(&mut StatefulEntity<S, P>) -> anyhow::Result<Outcome<S>> + Send + Sync,
{
    FnProcessor {
        f,
        _marker: PhantomData,
    }
}
