//! # In-Memory Entity Store
//!
//! Reference [`EntityStore`] implementation backed by a shared map.
//!
//! Handles created through [`InMemoryEntityStore::with_owner`] share the same
//! backing map, so several managers in one process behave exactly like
//! managers in separate processes against a shared database. All lease
//! decisions happen under the write lock, which makes `next_not_leased` a
//! single read-and-mark operation.

use super::{EntityStore, QuerySpec, StoreError, StoreResult};
use crate::clock::{Clock, SystemClock};
use crate::state_machine::{EntityPayload, EntityState, Lease, StatefulEntity};
use async_trait::async_trait;
use chrono::Duration;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

type EntityMap<S, P> = HashMap<String, StatefulEntity<S, P>>;

/// Shared in-memory store handle
#[derive(Debug)]
pub struct InMemoryEntityStore<S, P> {
    entities: Arc<RwLock<EntityMap<S, P>>>,
    owner_id: String,
    lease_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl<S: EntityState, P: EntityPayload> InMemoryEntityStore<S, P> {
    /// Create a new empty store using the system clock
    pub fn new(owner_id: impl Into<String>, lease_duration: Duration) -> Self {
        Self::with_clock(owner_id, lease_duration, Arc::new(SystemClock))
    }

    pub fn with_clock(
        owner_id: impl Into<String>,
        lease_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entities: Arc::new(RwLock::new(HashMap::new())),
            owner_id: owner_id.into(),
            lease_duration,
            clock,
        }
    }

    /// Another handle on the same backing map acting as a different owner
    pub fn with_owner(&self, owner_id: impl Into<String>) -> Self {
        Self {
            entities: Arc::clone(&self.entities),
            owner_id: owner_id.into(),
            lease_duration: self.lease_duration,
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl<S, P> Clone for InMemoryEntityStore<S, P> {
    fn clone(&self) -> Self {
        Self {
            entities: Arc::clone(&self.entities),
            owner_id: self.owner_id.clone(),
            lease_duration: self.lease_duration,
            clock: Arc::clone(&self.clock),
        }
    }
}

#[async_trait]
impl<S: EntityState, P: EntityPayload> EntityStore<S, P> for InMemoryEntityStore<S, P> {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    async fn find(&self, id: &str) -> StoreResult<Option<StatefulEntity<S, P>>> {
        Ok(self.entities.read().get(id).cloned())
    }

    async fn find_all(&self, query: &QuerySpec) -> StoreResult<Vec<StatefulEntity<S, P>>> {
        let now = self.clock.now();
        let snapshot: Vec<StatefulEntity<S, P>> = self.entities.read().values().cloned().collect();
        Ok(query.apply(snapshot, now))
    }

    async fn save(&self, entity: &StatefulEntity<S, P>) -> StoreResult<()> {
        let now = self.clock.now();
        let mut entities = self.entities.write();

        if let Some(existing) = entities.get(&entity.id) {
            if existing.is_leased_by_other(&self.owner_id, now) {
                let holder = existing
                    .lease
                    .as_ref()
                    .map(|lease| lease.owner_id.clone())
                    .unwrap_or_default();
                return Err(StoreError::LeaseConflict {
                    entity_id: entity.id.clone(),
                    owner_id: holder,
                });
            }
        }

        trace!(entity_id = %entity.id, state = %entity.state, owner_id = %self.owner_id, "Saving entity");
        entities.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn release(&self, entity: &StatefulEntity<S, P>) -> StoreResult<()> {
        let mut entities = self.entities.write();

        let existing = entities.get(&entity.id).ok_or_else(|| StoreError::NotFound {
            entity_id: entity.id.clone(),
        })?;

        if entity.lease.is_none() || existing.lease != entity.lease {
            let holder = existing
                .lease
                .as_ref()
                .map(|lease| lease.owner_id.clone())
                .unwrap_or_default();
            debug!(entity_id = %entity.id, holder = %holder, "Rejected write from a lease that is no longer held");
            return Err(StoreError::LeaseConflict {
                entity_id: entity.id.clone(),
                owner_id: holder,
            });
        }

        let mut released = entity.clone();
        released.clear_lease();
        trace!(entity_id = %entity.id, state = %entity.state, "Saving entity and releasing lease");
        entities.insert(entity.id.clone(), released);
        Ok(())
    }

    async fn lease_entity(&self, id: &str, owner_id: &str, duration: Duration) -> StoreResult<()> {
        let now = self.clock.now();
        let mut entities = self.entities.write();

        let entity = entities.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity_id: id.to_string(),
        })?;

        if entity.is_leased_by_other(owner_id, now) {
            let holder = entity
                .lease
                .as_ref()
                .map(|lease| lease.owner_id.clone())
                .unwrap_or_default();
            return Err(StoreError::LeaseConflict {
                entity_id: id.to_string(),
                owner_id: holder,
            });
        }

        entity.lease = Some(Lease::new(owner_id, now, duration));
        debug!(entity_id = %id, owner_id = %owner_id, "Entity leased");
        Ok(())
    }

    async fn next_not_leased(
        &self,
        batch_size: usize,
        states: &[S],
    ) -> StoreResult<Vec<StatefulEntity<S, P>>> {
        if batch_size == 0 || states.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let mut entities = self.entities.write();

        let mut candidates: Vec<&mut StatefulEntity<S, P>> = entities
            .values_mut()
            .filter(|entity| {
                states.contains(&entity.state) && !entity.is_leased(now) && entity.is_due(now)
            })
            .collect();

        // Oldest first so long-waiting entities are not starved
        candidates.sort_by_key(|entity| entity.state_timestamp);

        let leased: Vec<StatefulEntity<S, P>> = candidates
            .into_iter()
            .take(batch_size)
            .map(|entity| {
                entity.lease = Some(Lease::new(self.owner_id.clone(), now, self.lease_duration));
                entity.clone()
            })
            .collect();

        if !leased.is_empty() {
            debug!(
                owner_id = %self.owner_id,
                leased_count = leased.len(),
                "Leased batch of due entities"
            );
        }

        Ok(leased)
    }

    async fn delete(&self, id: &str) -> StoreResult<Option<StatefulEntity<S, P>>> {
        let now = self.clock.now();
        let mut entities = self.entities.write();

        if let Some(existing) = entities.get(id) {
            if existing.is_leased_by_other(&self.owner_id, now) {
                return Err(StoreError::LeaseConflict {
                    entity_id: id.to_string(),
                    owner_id: existing
                        .lease
                        .as_ref()
                        .map(|lease| lease.owner_id.clone())
                        .unwrap_or_default(),
                });
            }
        }

        Ok(entities.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state_machine::TransferState;
    use chrono::Utc;

    type Store = InMemoryEntityStore<TransferState, String>;

    fn store_with_clock() -> (Store, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let store = Store::with_clock("node-a", Duration::seconds(60), Arc::new(clock.clone()));
        (store, clock)
    }

    async fn seed(store: &Store, clock: &ManualClock, id: &str, state: TransferState) {
        let entity = StatefulEntity::with_id(id, state, format!("payload-{id}"), clock.now());
        store.save(&entity).await.unwrap();
    }

    #[tokio::test]
    async fn test_next_not_leased_filters_and_leases() {
        let (store, clock) = store_with_clock();
        seed(&store, &clock, "tp-1", TransferState::Initial).await;
        seed(&store, &clock, "tp-2", TransferState::Started).await;

        let batch = store.next_not_leased(10, &[TransferState::Initial]).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "tp-1");
        assert_eq!(batch[0].lease.as_ref().unwrap().owner_id, "node-a");

        // Already leased, not returned again even to the same owner
        let again = store.next_not_leased(10, &[TransferState::Initial]).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_next_not_leased_respects_due_time_and_batch_size() {
        let (store, clock) = store_with_clock();
        for i in 0..5 {
            seed(&store, &clock, &format!("tp-{i}"), TransferState::Initial).await;
        }
        let mut backing_off = store.find("tp-4").await.unwrap().unwrap();
        backing_off.state_timestamp = clock.now() + Duration::seconds(30);
        store.save(&backing_off).await.unwrap();

        let batch = store.next_not_leased(3, &[TransferState::Initial]).await.unwrap();
        assert_eq!(batch.len(), 3);
        let rest = store.next_not_leased(3, &[TransferState::Initial]).await.unwrap();
        assert_eq!(rest.len(), 1);

        clock.advance(Duration::seconds(31));
        let due = store.next_not_leased(3, &[TransferState::Initial]).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "tp-4");
    }

    #[tokio::test]
    async fn test_save_conflicts_with_foreign_lease() {
        let (store, clock) = store_with_clock();
        seed(&store, &clock, "tp-1", TransferState::Initial).await;
        let other = store.with_owner("node-b");

        other.lease_entity("tp-1", "node-b", Duration::seconds(10)).await.unwrap();

        let entity = store.find("tp-1").await.unwrap().unwrap();
        let err = store.save(&entity).await.unwrap_err();
        assert!(matches!(err, StoreError::LeaseConflict { ref owner_id, .. } if owner_id == "node-b"));

        clock.advance(Duration::seconds(10));
        store.save(&entity).await.unwrap();
    }

    #[tokio::test]
    async fn test_lease_entity_outcomes() {
        let (store, clock) = store_with_clock();
        seed(&store, &clock, "tp-1", TransferState::Initial).await;

        store.lease_entity("tp-1", "node-a", Duration::seconds(5)).await.unwrap();
        // Renewal by the holder is allowed
        store.lease_entity("tp-1", "node-a", Duration::seconds(5)).await.unwrap();

        let err = store.lease_entity("tp-1", "node-b", Duration::seconds(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::LeaseConflict { .. }));

        let err = store.lease_entity("missing", "node-a", Duration::seconds(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_release_is_fenced_by_the_held_lease() {
        let (store, clock) = store_with_clock();
        seed(&store, &clock, "tp-1", TransferState::Initial).await;
        let other = store.with_owner("node-b");

        let mut stale = store.next_not_leased(1, &[TransferState::Initial]).await.unwrap().remove(0);
        clock.advance(Duration::seconds(61));

        let mut reclaimed = other.next_not_leased(1, &[TransferState::Initial]).await.unwrap().remove(0);
        reclaimed.transition_to(TransferState::Provisioning, clock.now()).unwrap();
        other.release(&reclaimed).await.unwrap();
        assert!(store.find("tp-1").await.unwrap().unwrap().lease.is_none());

        // The reclaiming owner already released, the original lease is still gone
        stale.record_retry("slow", clock.now(), clock.now());
        let err = store.release(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::LeaseConflict { .. }));
        assert_eq!(store.find("tp-1").await.unwrap().unwrap().state, TransferState::Provisioning);

        // Releasing without a lease in hand is never accepted
        let unleased = store.find("tp-1").await.unwrap().unwrap();
        assert!(store.release(&unleased).await.is_err());
        assert!(matches!(
            store.release(&StatefulEntity::with_id("missing", TransferState::Initial, String::new(), clock.now())).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_honors_leases() {
        let (store, clock) = store_with_clock();
        seed(&store, &clock, "tp-1", TransferState::Completed).await;
        let other = store.with_owner("node-b");
        other.lease_entity("tp-1", "node-b", Duration::seconds(5)).await.unwrap();

        assert!(store.delete("tp-1").await.is_err());
        let removed = other.delete("tp-1").await.unwrap();
        assert_eq!(removed.unwrap().id, "tp-1");
        assert!(store.find("tp-1").await.unwrap().is_none());
        assert!(store.delete("tp-1").await.unwrap().is_none());
    }
}
