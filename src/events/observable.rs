//! # Observable
//!
//! Fan-out of entity events to synchronous and asynchronous listeners.
//!
//! Synchronous listeners run first, in registration order, inside the
//! `publish` call. The first failure stops publication and is returned to the
//! caller; a panicking listener counts as a failure and never unwinds into the
//! publisher. Asynchronous listeners only see events whose synchronous delivery
//! fully succeeded; they run on a background task fed by a bounded queue, and
//! their failures and panics are logged, never propagated.

use super::listener::{deliver, EntityListener, ListenerError, ListenerResult};
use super::types::Event;
use crate::config::EventsConfig;
use crate::constants::defaults::ASYNC_EVENT_BUFFER_SIZE;
use crate::state_machine::{EntityPayload, EntityState};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

type SharedListener<S, P> = Arc<dyn EntityListener<S, P>>;
type ListenerList<S, P> = Arc<RwLock<Vec<SharedListener<S, P>>>>;

/// Delivery statistics for the asynchronous path
#[derive(Debug, Default)]
pub struct ObservableStats {
    pub async_delivered: AtomicU64,
    pub async_failed: AtomicU64,
    pub async_dropped: AtomicU64,
}

pub struct Observable<S: EntityState, P: EntityPayload> {
    sync_listeners: ListenerList<S, P>,
    async_listeners: ListenerList<S, P>,
    async_queue: mpsc::Sender<Event<S, P>>,
    /// Receiver parked until the first event needs asynchronous delivery
    pending_receiver: Arc<Mutex<Option<mpsc::Receiver<Event<S, P>>>>>,
    stats: Arc<ObservableStats>,
}

impl<S: EntityState, P: EntityPayload> Observable<S, P> {
    pub fn new() -> Self {
        Self::with_buffer_size(ASYNC_EVENT_BUFFER_SIZE)
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        Self::with_buffer_size(config.async_buffer_size)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (async_queue, receiver) = mpsc::channel(buffer_size.max(1));
        Self {
            sync_listeners: Arc::new(RwLock::new(Vec::new())),
            async_listeners: Arc::new(RwLock::new(Vec::new())),
            async_queue,
            pending_receiver: Arc::new(Mutex::new(Some(receiver))),
            stats: Arc::new(ObservableStats::default()),
        }
    }

    /// Register a listener invoked inline by `publish`
    pub fn register_sync(&self, listener: SharedListener<S, P>) {
        debug!(listener = %listener.name(), "Registered synchronous listener");
        self.sync_listeners.write().push(listener);
    }

    /// Register a listener invoked on the background delivery task
    pub fn register_listener(&self, listener: SharedListener<S, P>) {
        debug!(listener = %listener.name(), "Registered asynchronous listener");
        self.async_listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.sync_listeners.read().len() + self.async_listeners.read().len()
    }

    pub fn stats(&self) -> &ObservableStats {
        &self.stats
    }

    /// Publish an event to every registered listener
    pub async fn publish(&self, event: Event<S, P>) -> ListenerResult<()> {
        let sync_listeners: Vec<SharedListener<S, P>> = self.sync_listeners.read().clone();

        for listener in &sync_listeners {
            let outcome = AssertUnwindSafe(deliver(listener.as_ref(), &event))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ListenerError::Failed(format!(
                        "listener {} panicked: {}",
                        listener.name(),
                        panic_message(panic.as_ref())
                    )))
                });
            if let Err(e) = outcome {
                warn!(
                    listener = %listener.name(),
                    event_id = %event.id,
                    entity_id = %event.entity_id(),
                    error = %e,
                    "Synchronous listener failed, stopping publication"
                );
                return Err(e);
            }
        }

        if self.async_listeners.read().is_empty() {
            return Ok(());
        }

        self.ensure_async_processor();

        match self.async_queue.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.stats.async_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    event_id = %event.id,
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    async_listeners = self.async_listeners.read().len(),
                    capacity = self.async_queue.max_capacity(),
                    dropped_total = dropped,
                    "Asynchronous listener queue full, event not delivered to asynchronous listeners"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(ListenerError::Failed("asynchronous delivery task stopped".to_string()))
            }
        }
    }

    fn ensure_async_processor(&self) {
        let Some(mut receiver) = self.pending_receiver.lock().take() else {
            return;
        };

        let listeners = Arc::clone(&self.async_listeners);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let snapshot: Vec<SharedListener<S, P>> = listeners.read().clone();
                for listener in snapshot {
                    let outcome = AssertUnwindSafe(deliver(listener.as_ref(), &event))
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(Ok(())) => {
                            stats.async_delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(e)) => {
                            stats.async_failed.fetch_add(1, Ordering::Relaxed);
                            error!(
                                listener = %listener.name(),
                                event_id = %event.id,
                                entity_id = %event.entity_id(),
                                error = %e,
                                "Asynchronous listener failed"
                            );
                        }
                        Err(_) => {
                            stats.async_failed.fetch_add(1, Ordering::Relaxed);
                            error!(
                                listener = %listener.name(),
                                event_id = %event.id,
                                entity_id = %event.entity_id(),
                                "Asynchronous listener panicked"
                            );
                        }
                    }
                }
            }
            debug!("Asynchronous event delivery stopped");
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl<S: EntityState, P: EntityPayload> Default for Observable<S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EntityState, P: EntityPayload> Clone for Observable<S, P> {
    fn clone(&self) -> Self {
        Self {
            sync_listeners: Arc::clone(&self.sync_listeners),
            async_listeners: Arc::clone(&self.async_listeners),
            async_queue: self.async_queue.clone(),
            pending_receiver: Arc::clone(&self.pending_receiver),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S: EntityState, P: EntityPayload> std::fmt::Debug for Observable<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("sync_listeners", &self.sync_listeners.read().len())
            .field("async_listeners", &self.async_listeners.read().len())
            .finish()
    }
}
