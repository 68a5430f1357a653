//! # Remote Message Dispatch
//!
//! The narrow capability state processors use to talk to counter-party
//! connectors. Wire encoding and transport live behind
//! [`RemoteMessageDispatcher`]; the core only resolves a dispatcher by
//! protocol and maps failures onto processing outcomes.
//!
//! Retries of the network call are the dispatcher's own concern. Retries of
//! the state transition are governed by the manager's retry policy.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Message addressed to a counter-party connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub protocol: String,
    pub message_type: String,
    pub counter_party_address: String,
    pub body: Value,
}

impl RemoteMessage {
    pub fn new(
        protocol: impl Into<String>,
        message_type: impl Into<String>,
        counter_party_address: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            message_type: message_type.into(),
            counter_party_address: counter_party_address.into(),
            body,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Temporary failure; the state transition should be retried
    #[error("Transient dispatch failure: {0}")]
    Transient(String),

    /// Counter-party rejected the message or it can never succeed
    #[error("Fatal dispatch failure: {0}")]
    Fatal(String),

    #[error("No dispatcher registered for protocol {0}")]
    UnsupportedProtocol(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Sends messages for one protocol and returns the counter-party's response
#[async_trait]
pub trait RemoteMessageDispatcher: Send + Sync {
    fn protocol(&self) -> &str;

    async fn send(&self, message: RemoteMessage) -> DispatchResult<Value>;
}

/// Resolves dispatchers by protocol
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: DashMap<String, Arc<dyn RemoteMessageDispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatcher, replacing any previous one for the same protocol
    pub fn register(&self, dispatcher: Arc<dyn RemoteMessageDispatcher>) {
        let protocol = dispatcher.protocol().to_string();
        debug!(protocol = %protocol, "Registered remote message dispatcher");
        self.dispatchers.insert(protocol, dispatcher);
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.dispatchers.contains_key(protocol)
    }

    pub async fn send(&self, message: RemoteMessage) -> DispatchResult<Value> {
        let dispatcher = self
            .dispatchers
            .get(&message.protocol)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DispatchError::UnsupportedProtocol(message.protocol.clone()))?;

        debug!(
            protocol = %message.protocol,
            message_type = %message.message_type,
            counter_party = %message.counter_party_address,
            "Dispatching remote message"
        );
        dispatcher.send(message).await
    }
}

impl std::fmt::Debug for DispatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protocols: Vec<String> = self.dispatchers.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("DispatcherRegistry")
            .field("protocols", &protocols)
            .finish()
    }
}
