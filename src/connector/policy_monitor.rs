//! Policy monitoring of running transfers.
//!
//! A monitor entry stays in STARTED while its contract policy remains valid
//! and is re-evaluated after each backoff. Expiry completes the entry; an
//! evaluator error fails it.

use crate::orchestration::{Outcome, StateMachineManagerBuilder, StateProcessor};
use crate::resilience::RetryPolicy;
use crate::state_machine::{PolicyMonitorState, StatefulEntity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMonitorEntry {
    pub contract_id: String,
    pub transfer_process_id: String,
}

pub type PolicyMonitorEntity = StatefulEntity<PolicyMonitorState, PolicyMonitorEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    Valid,
    Expired,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Policy evaluation failed for contract {contract_id}: {reason}")]
pub struct PolicyEvaluationError {
    pub contract_id: String,
    pub reason: String,
}

/// External policy engine
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        entry: &PolicyMonitorEntry,
        now: DateTime<Utc>,
    ) -> Result<PolicyStatus, PolicyEvaluationError>;
}

pub struct PolicyMonitorProcessor {
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl PolicyMonitorProcessor {
    pub fn new(evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl StateProcessor<PolicyMonitorState, PolicyMonitorEntry> for PolicyMonitorProcessor {
    async fn process(
        &self,
        entity: &mut PolicyMonitorEntity,
    ) -> anyhow::Result<Outcome<PolicyMonitorState>> {
        Ok(match self.evaluator.evaluate(&entity.payload, Utc::now()).await {
            Ok(PolicyStatus::Valid) => Outcome::Retry(format!(
                "Policy of contract {} still valid",
                entity.payload.contract_id
            )),
            Ok(PolicyStatus::Expired) => {
                info!(
                    entity_id = %entity.id,
                    contract_id = %entity.payload.contract_id,
                    transfer_process_id = %entity.payload.transfer_process_id,
                    "Contract policy expired"
                );
                Outcome::Advanced(PolicyMonitorState::Completed)
            }
            Err(e) => Outcome::Fatal(e.to_string()),
        })
    }
}

/// Register the monitor processor with an unbounded re-evaluation policy
pub fn register_processors(
    builder: StateMachineManagerBuilder<PolicyMonitorState, PolicyMonitorEntry>,
    evaluator: Arc<dyn PolicyEvaluator>,
    reevaluation: RetryPolicy,
) -> StateMachineManagerBuilder<PolicyMonitorState, PolicyMonitorEntry> {
    builder
        .processor(
            PolicyMonitorState::Started,
            Arc::new(PolicyMonitorProcessor::new(evaluator)),
        )
        .retry_policy_for(PolicyMonitorState::Started, reevaluation)
}
