//! # Connector Processors
//!
//! Standard payloads and state processors for the three entity kinds a
//! dataspace connector orchestrates: contract negotiations, transfer
//! processes and policy-monitor entries. Each submodule exposes a
//! `register_processors` helper that installs its processors on a
//! [`StateMachineManagerBuilder`](crate::orchestration::StateMachineManagerBuilder).

pub mod negotiation;
pub mod policy_monitor;
pub mod transfer;

pub use negotiation::{ContractAgreement, ContractNegotiation, ContractNegotiationProcessor, ContractOffer};
pub use policy_monitor::{
    PolicyEvaluationError, PolicyEvaluator, PolicyMonitorEntry, PolicyMonitorProcessor, PolicyStatus,
};
pub use transfer::{
    NoopProvisioner, ProvisionError, ProvisionedResource, Provisioner, TransferProcess, TransferProcessor,
};
