//! # State Machine Manager
//!
//! The polling orchestrator for one entity kind. Each iteration leases a batch
//! of due entities in actionable states, runs the processor registered for
//! each entity's state, persists the outcome with the lease released, and then
//! notifies listeners.
//!
//! Many managers of the same kind may run against one store, in this process
//! or in others. They never coordinate directly; the store's atomic
//! read-and-lease in `next_not_leased` is the only mutual exclusion.
//!
//! ## Event ordering
//!
//! Results are written back with [`EntityStore::release`], fenced by the lease
//! the entity was handed, so a manager whose lease expired and was reclaimed
//! can never overwrite newer state.
//!
//! Listeners are notified after the save that releases the lease. Another
//! manager may therefore observe the new state before listeners have run.
//! A failing synchronous listener cannot undo the persisted transition; the
//! failure is logged and counted in [`IterationResult::listener_errors`].

use super::outcome::Outcome;
use super::processor::StateProcessor;
use crate::clock::{Clock, SystemClock};
use crate::config::ConnectorConfig;
use crate::error::{CoreError, Result};
use crate::events::{Event, Observable};
use crate::logging::{log_entity_operation, log_error};
use crate::resilience::{ExponentialWaitStrategy, RetryDecision, RetryPolicy, WaitStrategy};
use crate::state_machine::{EntityPayload, EntityState, StatefulEntity};
use crate::store::{EntityStore, QuerySpec, StoreError};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

type SharedProcessor<S, P> = Arc<dyn StateProcessor<S, P>>;

/// Counters for a single polling iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationResult {
    /// Entities leased by this iteration
    pub leased: usize,
    pub advanced: usize,
    pub retried: usize,
    /// Entities moved to their terminal failure state
    pub failed: usize,
    /// Saves rejected because the lease expired and was taken over
    pub conflicts: usize,
    pub listener_errors: usize,
}

impl IterationResult {
    /// No entity was due
    pub fn is_empty(&self) -> bool {
        self.leased == 0
    }
}

pub struct StateMachineManager<S: EntityState, P: EntityPayload> {
    name: String,
    store: Arc<dyn EntityStore<S, P>>,
    processors: HashMap<S, SharedProcessor<S, P>>,
    actionable_states: Vec<S>,
    wait_strategy: Arc<dyn WaitStrategy>,
    retry_policy: RetryPolicy,
    state_retry_policies: HashMap<S, RetryPolicy>,
    batch_size: usize,
    observable: Observable<S, P>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    processing_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<S: EntityState, P: EntityPayload> StateMachineManager<S, P> {
    pub fn builder(name: impl Into<String>) -> StateMachineManagerBuilder<S, P> {
        StateMachineManagerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_id(&self) -> &str {
        self.store.owner_id()
    }

    /// States with a registered processor, ordered by code
    pub fn actionable_states(&self) -> &[S] {
        &self.actionable_states
    }

    pub fn observable(&self) -> &Observable<S, P> {
        &self.observable
    }

    /// Retry policy governing entities in `state`
    pub fn retry_policy_for(&self, state: S) -> &RetryPolicy {
        self.state_retry_policies
            .get(&state)
            .unwrap_or(&self.retry_policy)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Persist a new entity and announce it
    pub async fn create(&self, entity: StatefulEntity<S, P>) -> Result<()> {
        self.store.save(&entity).await?;
        log_entity_operation("create", &self.name, &entity.id, Some(entity.state.name()), "ok", None);
        self.observable
            .publish(Event::created(entity, self.clock.now()))
            .await?;
        Ok(())
    }

    /// Remove an entity and announce the deletion, returning whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        match self.store.delete(id).await? {
            Some(entity) => {
                log_entity_operation("delete", &self.name, id, Some(entity.state.name()), "ok", None);
                self.observable
                    .publish(Event::deleted(entity, self.clock.now()))
                    .await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn find(&self, id: &str) -> Result<Option<StatefulEntity<S, P>>> {
        Ok(self.store.find(id).await?)
    }

    pub async fn query(&self, query: &QuerySpec) -> Result<Vec<StatefulEntity<S, P>>> {
        Ok(self.store.find_all(query).await?)
    }

    /// Run one polling iteration.
    ///
    /// Only a failure to lease a batch is returned as an error. Per-entity
    /// failures are absorbed into the entity's retry bookkeeping.
    #[instrument(skip(self), fields(manager = %self.name, owner_id = %self.store.owner_id()))]
    pub async fn run_iteration(&self) -> Result<IterationResult> {
        let mut result = IterationResult::default();

        let batch = self
            .store
            .next_not_leased(self.batch_size, &self.actionable_states)
            .await?;
        result.leased = batch.len();

        for entity in batch {
            self.process_entity(entity, &mut result).await;
        }

        if !result.is_empty() {
            debug!(
                leased = result.leased,
                advanced = result.advanced,
                retried = result.retried,
                failed = result.failed,
                conflicts = result.conflicts,
                "Iteration complete"
            );
        }

        Ok(result)
    }

    async fn process_entity(&self, entity: StatefulEntity<S, P>, result: &mut IterationResult) {
        let Some(processor) = self.processors.get(&entity.state).cloned() else {
            // Only actionable states are leased; reaching here means the entity changed underneath us
            warn!(entity_id = %entity.id, state = %entity.state, "No processor for leased entity, releasing");
            let mut released = entity;
            self.persist(&mut released, result).await;
            return;
        };

        self.retry_policy_for(entity.state)
            .notify_retry(&entity.id, entity.state_count);

        let mut working = entity.clone();
        let outcome = match AssertUnwindSafe(processor.process(&mut working))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                working = entity.clone();
                Outcome::Retry(format!("{e:#}"))
            }
            Err(panic) => {
                working = entity.clone();
                let reason = panic_message(panic.as_ref());
                error!(entity_id = %entity.id, state = %entity.state, reason = %reason, "State processor panicked");
                Outcome::Retry(reason)
            }
        };
        // The lease handed out by the store is the fencing token for the write back
        working.lease = entity.lease.clone();

        debug!(entity_id = %entity.id, state = %entity.state, outcome = outcome.label(), "Processed entity");
        self.apply_outcome(working, outcome, result).await;
    }

    async fn apply_outcome(
        &self,
        mut entity: StatefulEntity<S, P>,
        outcome: Outcome<S>,
        result: &mut IterationResult,
    ) {
        let from = entity.state;
        let now = self.clock.now();
        let retry_policy = self.retry_policy_for(from);

        match outcome {
            Outcome::Advanced(next) => match entity.transition_to(next, now) {
                Ok(()) => {
                    if self.persist(&mut entity, result).await {
                        result.advanced += 1;
                        info!(entity_id = %entity.id, from = %from, to = %next, "Entity advanced");
                        self.notify(Event::transitioned(from, entity, now), result).await;
                    }
                }
                Err(e) => {
                    error!(entity_id = %entity.id, error = %e, "Processor requested an undeclared transition");
                    retry_policy.notify_abort(&entity.id, &e.to_string());
                    self.fail(entity, e.to_string(), result).await;
                }
            },
            Outcome::Retry(reason) => {
                match retry_policy.decide(&entity.id, entity.state_count, &reason) {
                    RetryDecision::RetryAfter(delay) => {
                        let due_at = now + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::days(36_500));
                        entity.record_retry(reason.as_str(), due_at, now);
                        if self.persist(&mut entity, result).await {
                            result.retried += 1;
                            debug!(
                                entity_id = %entity.id,
                                state = %entity.state,
                                state_count = entity.state_count,
                                delay_ms = delay.as_millis() as u64,
                                reason = %reason,
                                "Entity scheduled for retry"
                            );
                        }
                    }
                    RetryDecision::Exhausted => {
                        warn!(
                            entity_id = %entity.id,
                            state = %entity.state,
                            attempts = entity.state_count,
                            reason = %reason,
                            "Retries exhausted"
                        );
                        self.fail(entity, reason, result).await;
                    }
                }
            }
            Outcome::Fatal(reason) => {
                retry_policy.notify_abort(&entity.id, &reason);
                self.fail(entity, reason, result).await;
            }
        }
    }

    async fn fail(&self, mut entity: StatefulEntity<S, P>, reason: String, result: &mut IterationResult) {
        let from = entity.state;
        let now = self.clock.now();
        entity.fail(reason.as_str(), now);

        if self.persist(&mut entity, result).await {
            result.failed += 1;
            warn!(entity_id = %entity.id, from = %from, to = %entity.state, reason = %reason, "Entity failed");
            if entity.state != from {
                self.notify(Event::transitioned(from, entity, now), result).await;
            }
        }
    }

    /// Write the entity back under its lease and release it, returning whether the write went through
    async fn persist(&self, entity: &mut StatefulEntity<S, P>, result: &mut IterationResult) -> bool {
        match self.store.release(entity).await {
            Ok(()) => {
                entity.clear_lease();
                true
            }
            Err(StoreError::LeaseConflict { owner_id, .. }) => {
                result.conflicts += 1;
                warn!(
                    entity_id = %entity.id,
                    holder = %owner_id,
                    "Lease lost before save, discarding result"
                );
                false
            }
            Err(StoreError::NotFound { .. }) => {
                result.conflicts += 1;
                warn!(entity_id = %entity.id, "Entity deleted while leased, discarding result");
                false
            }
            Err(e) => {
                log_error(&self.name, "save", &e.to_string(), Some(entity.id.as_str()));
                false
            }
        }
    }

    async fn notify(&self, event: Event<S, P>, result: &mut IterationResult) {
        let entity_id = event.entity_id().to_string();
        if let Err(e) = self.observable.publish(event).await {
            result.listener_errors += 1;
            error!(entity_id = %entity_id, error = %e, "Synchronous listener failed after save");
        }
    }

    /// Spawn the polling loop
    #[instrument(skip(self), fields(manager = %self.name))]
    pub fn start(self: Arc<Self>) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CoreError::InvalidState(format!(
                "State machine manager {} is already running",
                self.name
            )));
        }

        let manager = Arc::clone(&self);
        let handle = tokio::spawn(async move { manager.run_loop().await });
        *self.processing_handle.lock() = Some(handle);

        info!(batch_size = self.batch_size, states = ?self.actionable_states, "State machine manager started");
        Ok(())
    }

    /// Stop the polling loop, waiting up to `timeout` for the current iteration
    #[instrument(skip(self), fields(manager = %self.name))]
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown_notify.notify_one();

        let handle = self.processing_handle.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!("State machine manager stopped"),
                Ok(Err(e)) => warn!(error = %e, "Processing task ended abnormally"),
                Err(_) => {
                    return Err(CoreError::Timeout(format!(
                        "State machine manager {} did not stop within {:?}",
                        self.name, timeout
                    )));
                }
            }
        }
        Ok(())
    }

    async fn run_loop(&self) {
        while self.is_running() {
            let made_progress = match self.run_iteration().await {
                Ok(result) => !result.is_empty(),
                Err(e) => {
                    // Store unavailability only costs this iteration
                    log_error(&self.name, "run_iteration", &e.to_string(), None);
                    false
                }
            };

            if made_progress {
                self.wait_strategy.success();
                tokio::task::yield_now().await;
                continue;
            }

            let wait = self.wait_strategy.wait_duration();
            self.wait_strategy.failures(1);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = self.shutdown_notify.notified() => {
                    debug!(manager = %self.name, "Shutdown notification received");
                    break;
                }
            }
        }
        self.running.store(false, Ordering::Release);
        debug!(manager = %self.name, "Polling loop ended");
    }
}

impl<S: EntityState, P: EntityPayload> std::fmt::Debug for StateMachineManager<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachineManager")
            .field("name", &self.name)
            .field("owner_id", &self.store.owner_id())
            .field("actionable_states", &self.actionable_states)
            .field("batch_size", &self.batch_size)
            .field("running", &self.is_running())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Processor panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Processor panicked: {message}")
    } else {
        "Processor panicked".to_string()
    }
}

/// Builder for [`StateMachineManager`]
pub struct StateMachineManagerBuilder<S: EntityState, P: EntityPayload> {
    name: String,
    store: Option<Arc<dyn EntityStore<S, P>>>,
    processors: HashMap<S, SharedProcessor<S, P>>,
    wait_strategy: Option<Arc<dyn WaitStrategy>>,
    retry_policy: RetryPolicy,
    state_retry_policies: HashMap<S, RetryPolicy>,
    batch_size: usize,
    observable: Option<Observable<S, P>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<S: EntityState, P: EntityPayload> StateMachineManagerBuilder<S, P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: None,
            processors: HashMap::new(),
            wait_strategy: None,
            retry_policy: RetryPolicy::default(),
            state_retry_policies: HashMap::new(),
            batch_size: crate::constants::defaults::BATCH_SIZE,
            observable: None,
            clock: None,
        }
    }

    /// Apply batch size, idle backoff and retry bounds from configuration
    pub fn with_config(mut self, config: &ConnectorConfig) -> Self {
        self.batch_size = config.state_machine.batch_size;
        self.wait_strategy = Some(Arc::new(ExponentialWaitStrategy::from_config(&config.state_machine)));
        self.retry_policy = RetryPolicy::from_config(&config.retry);
        if self.observable.is_none() {
            self.observable = Some(Observable::from_config(&config.events));
        }
        self
    }

    pub fn store(mut self, store: Arc<dyn EntityStore<S, P>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register the processor for `state`, replacing any previous one
    pub fn processor(mut self, state: S, processor: Arc<dyn StateProcessor<S, P>>) -> Self {
        self.processors.insert(state, processor);
        self
    }

    pub fn wait_strategy(mut self, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        self.wait_strategy = Some(wait_strategy);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Override the retry policy for entities in one state.
    ///
    /// States that poll an external condition (a running data flow, a policy
    /// that is still valid) use an unbounded policy so waiting never exhausts.
    pub fn retry_policy_for(mut self, state: S, retry_policy: RetryPolicy) -> Self {
        self.state_retry_policies.insert(state, retry_policy);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn observable(mut self, observable: Observable<S, P>) -> Self {
        self.observable = Some(observable);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<StateMachineManager<S, P>> {
        let store = self.store.ok_or_else(|| {
            CoreError::InvalidState(format!("State machine manager {} has no store", self.name))
        })?;

        if self.batch_size == 0 {
            return Err(CoreError::InvalidState(format!(
                "State machine manager {} needs a batch size greater than 0",
                self.name
            )));
        }

        if let Some(terminal) = self.processors.keys().find(|state| state.is_terminal()) {
            return Err(CoreError::InvalidState(format!(
                "Terminal state {terminal} cannot have a processor"
            )));
        }

        let mut actionable_states: Vec<S> = self.processors.keys().copied().collect();
        actionable_states.sort_by_key(|state| state.code());

        let wait_strategy = self.wait_strategy.unwrap_or_else(|| {
            Arc::new(ExponentialWaitStrategy::from_config(&Default::default()))
        });

        Ok(StateMachineManager {
            name: self.name,
            store,
            processors: self.processors,
            actionable_states,
            wait_strategy,
            retry_policy: self.retry_policy,
            state_retry_policies: self.state_retry_policies,
            batch_size: self.batch_size,
            observable: self.observable.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            processing_handle: parking_lot::Mutex::new(None),
        })
    }
}
