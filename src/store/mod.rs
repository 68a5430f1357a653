//! # Entity Store
//!
//! Persistence contract for stateful entities with lease-based optimistic
//! concurrency.
//!
//! ## Leasing
//!
//! Every store handle is bound to an owner id. `next_not_leased` and
//! `lease_entity` atomically mark entities as owned for a bounded duration;
//! `save` and `delete` refuse to touch an entity whose live lease belongs to a
//! different owner. Expired leases are treated as absent, which is how work
//! held by a crashed process is recovered.
//!
//! Lease holders write their results back with `release`, which uses the
//! lease they were handed as a fencing token. Once that lease has been
//! reclaimed by another owner, even if that owner has since released the
//! entity, the late write fails with [`StoreError::LeaseConflict`] instead of
//! moving the entity back to an older state. `save` stays a plain upsert for
//! creating entities and for writers that do not hold a lease.
//!
//! Backing implementations must perform the read-and-mark of
//! `next_not_leased` as a single atomic operation (a conditional update on an
//! unexpired-lease predicate, a row lock with `SKIP LOCKED`, or a write lock
//! for the in-memory store).

pub mod memory;
pub mod query;

pub use memory::InMemoryEntityStore;
pub use query::{Criterion, Operator, QuerySpec, SortOrder};

use crate::state_machine::{EntityPayload, EntityState, StatefulEntity};
use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

/// Errors reported by entity stores
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Entity {entity_id} not found")]
    NotFound { entity_id: String },

    #[error("Entity {entity_id} is leased by {owner_id}")]
    LeaseConflict { entity_id: String, owner_id: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract every backing store must honor
#[async_trait]
pub trait EntityStore<S: EntityState, P: EntityPayload>: Send + Sync {
    /// Owner id used for leases taken and checked by this handle
    fn owner_id(&self) -> &str;

    /// Load a single entity
    async fn find(&self, id: &str) -> StoreResult<Option<StatefulEntity<S, P>>>;

    /// Filter, sort and paginate entities
    async fn find_all(&self, query: &QuerySpec) -> StoreResult<Vec<StatefulEntity<S, P>>>;

    /// Upsert an entity, persisting its lease field as given.
    ///
    /// Fails with [`StoreError::LeaseConflict`] while another owner holds a live lease.
    async fn save(&self, entity: &StatefulEntity<S, P>) -> StoreResult<()>;

    /// Persist `entity` and release the lease it carries.
    ///
    /// Succeeds only while the stored entity still carries exactly that lease;
    /// the entity is stored with its lease cleared.
    async fn release(&self, entity: &StatefulEntity<S, P>) -> StoreResult<()>;

    /// Acquire or renew a lease for `owner_id`
    async fn lease_entity(&self, id: &str, owner_id: &str, duration: Duration) -> StoreResult<()>;

    /// Lease and return up to `batch_size` due, unleased entities in one of `states`
    async fn next_not_leased(
        &self,
        batch_size: usize,
        states: &[S],
    ) -> StoreResult<Vec<StatefulEntity<S, P>>>;

    /// Remove an entity, returning it if it existed
    async fn delete(&self, id: &str) -> StoreResult<Option<StatefulEntity<S, P>>>;
}
