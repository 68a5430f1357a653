//! Transfer process payload, the provisioning collaborator and the processors
//! that drive a transfer from INITIAL to DEPROVISIONED.

use crate::cache::FlowCompletionCache;
use crate::constants::message_types;
use crate::dispatch::{DispatcherRegistry, RemoteMessage};
use crate::orchestration::{Outcome, StateMachineManagerBuilder, StateProcessor};
use crate::resilience::RetryPolicy;
use crate::state_machine::{StatefulEntity, TransferState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub id: String,
    pub resource_type: String,
    pub details: Value,
}

/// Business payload of a transfer process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProcess {
    pub asset_id: String,
    pub contract_id: String,
    pub protocol: String,
    pub counter_party_address: String,
    pub data_destination: Value,
    #[serde(default)]
    pub provisioned_resources: Vec<ProvisionedResource>,
    pub data_flow_id: Option<String>,
}

pub type TransferEntity = StatefulEntity<TransferState, TransferProcess>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProvisionError {
    #[error("Transient provisioning failure: {0}")]
    Transient(String),

    #[error("Provisioning failed: {0}")]
    Fatal(String),
}

impl<S: crate::state_machine::EntityState> From<ProvisionError> for Outcome<S> {
    fn from(error: ProvisionError) -> Self {
        match error {
            ProvisionError::Transient(_) => Outcome::Retry(error.to_string()),
            ProvisionError::Fatal(_) => Outcome::Fatal(error.to_string()),
        }
    }
}

/// Allocates and releases the resources a transfer needs
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, transfer: &TransferProcess) -> Result<Vec<ProvisionedResource>, ProvisionError>;

    async fn deprovision(&self, transfer: &TransferProcess) -> Result<(), ProvisionError>;
}

/// Provisioner for transfers that need no resources
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    async fn provision(&self, _transfer: &TransferProcess) -> Result<Vec<ProvisionedResource>, ProvisionError> {
        Ok(Vec::new())
    }

    async fn deprovision(&self, _transfer: &TransferProcess) -> Result<(), ProvisionError> {
        Ok(())
    }
}

pub struct TransferProcessor {
    dispatcher: Arc<DispatcherRegistry>,
    provisioner: Arc<dyn Provisioner>,
    flow_cache: Arc<FlowCompletionCache>,
}

impl TransferProcessor {
    pub fn new(
        dispatcher: Arc<DispatcherRegistry>,
        provisioner: Arc<dyn Provisioner>,
        flow_cache: Arc<FlowCompletionCache>,
    ) -> Self {
        Self {
            dispatcher,
            provisioner,
            flow_cache,
        }
    }

    async fn provision_and_start(&self, entity: &mut TransferEntity) -> Outcome<TransferState> {
        // Resources survive a retry in the payload, so provisioning runs once
        if entity.payload.provisioned_resources.is_empty() {
            match self.provisioner.provision(&entity.payload).await {
                Ok(resources) => {
                    debug!(entity_id = %entity.id, resources = resources.len(), "Provisioned transfer resources");
                    entity.payload.provisioned_resources = resources;
                }
                Err(e) => return e.into(),
            }
        }

        let data_flow_id = entity
            .payload
            .data_flow_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let message = RemoteMessage::new(
            entity.payload.protocol.as_str(),
            message_types::TRANSFER_START,
            entity.payload.counter_party_address.as_str(),
            json!({
                "processId": entity.id,
                "dataFlowId": data_flow_id,
                "dataAddress": entity.payload.data_destination,
            }),
        );

        match self.dispatcher.send(message).await {
            Ok(_) => Outcome::Advanced(TransferState::Started),
            Err(e) => Outcome::from_dispatch_error(&e),
        }
    }

    fn check_completion(&self, entity: &TransferEntity) -> Outcome<TransferState> {
        let Some(data_flow_id) = entity.payload.data_flow_id.as_deref() else {
            return Outcome::Fatal(format!("Transfer {} started without a data flow", entity.id));
        };

        match self.flow_cache.get(data_flow_id) {
            None => Outcome::Retry(format!("Awaiting completion of data flow {data_flow_id}")),
            Some(completion) => match completion.error {
                None => {
                    info!(entity_id = %entity.id, data_flow_id = %data_flow_id, "Data flow completed");
                    Outcome::Advanced(TransferState::Completed)
                }
                Some(error) => Outcome::Fatal(format!("Data flow {data_flow_id} failed: {error}")),
            },
        }
    }

    async fn deprovision(&self, entity: &mut TransferEntity) -> Outcome<TransferState> {
        match self.provisioner.deprovision(&entity.payload).await {
            Ok(()) => {
                entity.payload.provisioned_resources.clear();
                Outcome::Advanced(TransferState::Deprovisioned)
            }
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl StateProcessor<TransferState, TransferProcess> for TransferProcessor {
    async fn process(&self, entity: &mut TransferEntity) -> anyhow::Result<Outcome<TransferState>> {
        Ok(match entity.state {
            TransferState::Initial => Outcome::Advanced(TransferState::Provisioning),
            TransferState::Provisioning => self.provision_and_start(entity).await,
            TransferState::Started => self.check_completion(entity),
            TransferState::Deprovisioning => self.deprovision(entity).await,
            other => Outcome::Fatal(format!("No transfer processing for state {other}")),
        })
    }
}

/// Register the transfer processor for every actionable state.
///
/// STARTED polls the flow-completion cache, so it gets an unbounded retry
/// policy bounded only by `completion_poll`.
pub fn register_processors(
    builder: StateMachineManagerBuilder<TransferState, TransferProcess>,
    processor: Arc<TransferProcessor>,
    completion_poll: RetryPolicy,
) -> StateMachineManagerBuilder<TransferState, TransferProcess> {
    [
        TransferState::Initial,
        TransferState::Provisioning,
        TransferState::Started,
        TransferState::Deprovisioning,
    ]
    .into_iter()
    .fold(builder, |builder, state| builder.processor(state, processor.clone()))
    .retry_policy_for(TransferState::Started, completion_poll)
}
