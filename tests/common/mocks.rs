//! Test doubles for the store, dispatcher and listener seams.

use async_trait::async_trait;
use chrono::Duration;
use dataspace_core::dispatch::{DispatchError, DispatchResult, RemoteMessage, RemoteMessageDispatcher};
use dataspace_core::events::{EntityListener, Event, ListenerError, ListenerResult};
use dataspace_core::state_machine::{EntityPayload, EntityState, StatefulEntity};
use dataspace_core::store::{EntityStore, QuerySpec, StoreError, StoreResult};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Store wrapper whose batch leasing can be switched off to simulate an outage
pub struct FlakyStore<S: EntityState, P: EntityPayload> {
    inner: Arc<dyn EntityStore<S, P>>,
    unavailable: AtomicBool,
    lease_calls: AtomicUsize,
}

impl<S: EntityState, P: EntityPayload> FlakyStore<S, P> {
    pub fn new(inner: Arc<dyn EntityStore<S, P>>) -> Self {
        Self {
            inner,
            unavailable: AtomicBool::new(false),
            lease_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn lease_calls(&self) -> usize {
        self.lease_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: EntityState, P: EntityPayload> EntityStore<S, P> for FlakyStore<S, P> {
    fn owner_id(&self) -> &str {
        self.inner.owner_id()
    }

    async fn find(&self, id: &str) -> StoreResult<Option<StatefulEntity<S, P>>> {
        self.inner.find(id).await
    }

    async fn find_all(&self, query: &QuerySpec) -> StoreResult<Vec<StatefulEntity<S, P>>> {
        self.inner.find_all(query).await
    }

    async fn save(&self, entity: &StatefulEntity<S, P>) -> StoreResult<()> {
        self.inner.save(entity).await
    }

    async fn release(&self, entity: &StatefulEntity<S, P>) -> StoreResult<()> {
        self.inner.release(entity).await
    }

    async fn lease_entity(&self, id: &str, owner_id: &str, duration: Duration) -> StoreResult<()> {
        self.inner.lease_entity(id, owner_id, duration).await
    }

    async fn next_not_leased(
        &self,
        batch_size: usize,
        states: &[S],
    ) -> StoreResult<Vec<StatefulEntity<S, P>>> {
        self.lease_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.next_not_leased(batch_size, states).await
    }

    async fn delete(&self, id: &str) -> StoreResult<Option<StatefulEntity<S, P>>> {
        self.inner.delete(id).await
    }
}

/// Dispatcher that records every message and replays scripted responses
pub struct ScriptedDispatcher {
    protocol: String,
    responses: Mutex<VecDeque<DispatchResult<Value>>>,
    sent: Mutex<Vec<RemoteMessage>>,
}

impl ScriptedDispatcher {
    pub fn new(protocol: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            responses: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response; once the script runs out every send succeeds
    pub fn respond_with(&self, response: DispatchResult<Value>) {
        self.responses.lock().push_back(response);
    }

    pub fn fail_transiently(&self, reason: &str) {
        self.respond_with(Err(DispatchError::Transient(reason.to_string())));
    }

    pub fn sent(&self) -> Vec<RemoteMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.message_type.clone()).collect()
    }
}

#[async_trait]
impl RemoteMessageDispatcher for ScriptedDispatcher {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn send(&self, message: RemoteMessage) -> DispatchResult<Value> {
        self.sent.lock().push(message);
        self.responses.lock().pop_front().unwrap_or_else(|| Ok(json!({})))
    }
}

/// Listener that records `<event type>:<entity id>:<state>` lines
pub struct RecordingListener {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
    reject: AtomicBool,
}

impl RecordingListener {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            log: Arc::new(Mutex::new(Vec::new())),
            reject: AtomicBool::new(false),
        }
    }

    pub fn rejecting(label: &str) -> Self {
        let listener = Self::new(label);
        listener.reject.store(true, Ordering::SeqCst);
        listener
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn record<S: EntityState, P: EntityPayload>(&self, event: &Event<S, P>) -> ListenerResult<()> {
        let entity = event.payload.entity();
        self.log
            .lock()
            .push(format!("{}:{}:{}", event.event_type(), entity.id, entity.state));
        if self.reject.load(Ordering::SeqCst) {
            return Err(ListenerError::rejected(self.label.as_str(), event.id.as_str(), "rejected by test"));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: EntityState, P: EntityPayload> EntityListener<S, P> for RecordingListener {
    fn name(&self) -> &str {
        &self.label
    }

    async fn created(&self, event: &Event<S, P>) -> ListenerResult<()> {
        self.record(event)
    }

    async fn transitioned(&self, event: &Event<S, P>) -> ListenerResult<()> {
        self.record(event)
    }

    async fn deleted(&self, event: &Event<S, P>) -> ListenerResult<()> {
        self.record(event)
    }
}
