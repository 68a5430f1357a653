//! Contract negotiation payload and the processors that drive its
//! consumer-side states.

use crate::constants::message_types;
use crate::dispatch::{DispatcherRegistry, RemoteMessage};
use crate::orchestration::{Outcome, StateMachineManagerBuilder, StateProcessor};
use crate::state_machine::{NegotiationState, StatefulEntity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractOffer {
    pub id: String,
    pub asset_id: String,
    pub policy: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractAgreement {
    pub id: String,
    pub asset_id: String,
    pub provider_id: String,
    pub consumer_id: String,
    pub signed_at: DateTime<Utc>,
    pub policy: Value,
}

/// Business payload of a contract negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractNegotiation {
    pub counter_party_id: String,
    pub counter_party_address: String,
    pub protocol: String,
    pub offer: ContractOffer,
    pub agreement: Option<ContractAgreement>,
}

pub type NegotiationEntity = StatefulEntity<NegotiationState, ContractNegotiation>;

/// Sends the message belonging to the entity's state and advances on success
#[derive(Debug, Clone)]
pub struct ContractNegotiationProcessor {
    dispatcher: Arc<DispatcherRegistry>,
}

impl ContractNegotiationProcessor {
    pub fn new(dispatcher: Arc<DispatcherRegistry>) -> Self {
        Self { dispatcher }
    }

    fn message_for(entity: &NegotiationEntity) -> Result<(RemoteMessage, NegotiationState), String> {
        let negotiation = &entity.payload;
        let (message_type, body, next) = match entity.state {
            NegotiationState::Requested => (
                message_types::CONTRACT_REQUEST,
                json!({
                    "processId": entity.id,
                    "offer": negotiation.offer,
                }),
                NegotiationState::Offered,
            ),
            NegotiationState::Agreed => {
                let agreement = negotiation
                    .agreement
                    .as_ref()
                    .ok_or_else(|| format!("Negotiation {} is AGREED without an agreement", entity.id))?;
                (
                    message_types::CONTRACT_AGREEMENT_VERIFICATION,
                    json!({
                        "processId": entity.id,
                        "agreementId": agreement.id,
                    }),
                    NegotiationState::Verified,
                )
            }
            NegotiationState::Verified => (
                message_types::CONTRACT_NEGOTIATION_EVENT,
                json!({
                    "processId": entity.id,
                    "eventType": "FINALIZED",
                }),
                NegotiationState::Finalized,
            ),
            other => return Err(format!("No negotiation message for state {other}")),
        };

        let message = RemoteMessage::new(
            negotiation.protocol.as_str(),
            message_type,
            negotiation.counter_party_address.as_str(),
            body,
        );
        Ok((message, next))
    }
}

#[async_trait]
impl StateProcessor<NegotiationState, ContractNegotiation> for ContractNegotiationProcessor {
    async fn process(&self, entity: &mut NegotiationEntity) -> anyhow::Result<Outcome<NegotiationState>> {
        let (message, next) = match Self::message_for(entity) {
            Ok(prepared) => prepared,
            Err(reason) => return Ok(Outcome::Fatal(reason)),
        };

        debug!(entity_id = %entity.id, message_type = %message.message_type, "Sending negotiation message");
        Ok(match self.dispatcher.send(message).await {
            Ok(_) => Outcome::Advanced(next),
            Err(e) => Outcome::from_dispatch_error(&e),
        })
    }
}

/// Register the negotiation processor for every state it handles
pub fn register_processors(
    builder: StateMachineManagerBuilder<NegotiationState, ContractNegotiation>,
    dispatcher: Arc<DispatcherRegistry>,
) -> StateMachineManagerBuilder<NegotiationState, ContractNegotiation> {
    let processor = Arc::new(ContractNegotiationProcessor::new(dispatcher));
    [
        NegotiationState::Requested,
        NegotiationState::Agreed,
        NegotiationState::Verified,
    ]
    .into_iter()
    .fold(builder, |builder, state| builder.processor(state, processor.clone()))
}
