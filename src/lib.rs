#![allow(clippy::doc_markdown)] // Allow technical terms like DataFlow, JSON-LD in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Dataspace Core
//!
//! Crash-resilient orchestration core for dataspace connectors.
//!
//! ## Overview
//!
//! A connector drives long-running entities (contract negotiations, transfer
//! processes, policy-monitor entries) through explicit state graphs. Every
//! entity lives in a shared store; any number of connector processes poll that
//! store, lease due entities, run the processor registered for the entity's
//! state and write the result back. A process that dies mid-processing simply
//! lets its leases expire, and another process picks the work up.
//!
//! ## Key Features
//!
//! - **Leased Entity Store**: Atomic lease-and-return of due entities, lease-checked saves
//! - **Polling State Machines**: Per-state processors returning explicit outcomes
//! - **Bounded Retries**: Exponential backoff persisted on the entity, terminal failure on exhaustion
//! - **Commands**: Cancel, deprovision and custom operations under the same leasing discipline
//! - **Lifecycle Events**: Synchronous and asynchronous listeners with failure isolation
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Entity record, state enumerations and transition graphs
//! - [`store`] - Persistence contract, query model and the in-memory store
//! - [`orchestration`] - State machine manager, processors and outcomes
//! - [`resilience`] - Retry policies and polling wait strategies
//! - [`commands`] - Command handlers and their registry
//! - [`events`] - Entity events, listeners and the observable
//! - [`dispatch`] - Outbound protocol message seam
//! - [`connector`] - Negotiation, transfer and policy-monitor processors
//! - [`cache`] - Data flow completion cache
//! - [`config`] - Layered configuration loading
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dataspace_core::config::ConfigManager;
//! use dataspace_core::orchestration::StateMachineManager;
//! use dataspace_core::state_machine::TransferState;
//! use dataspace_core::store::InMemoryEntityStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! dataspace_core::logging::init_structured_logging();
//! let config = ConfigManager::load()?;
//!
//! let store = Arc::new(InMemoryEntityStore::<TransferState, ()>::new(
//!     "node-a",
//!     config.config().lease.duration(),
//! ));
//! let manager = Arc::new(
//!     StateMachineManager::<TransferState, ()>::builder("transfer-process")
//!         .with_config(config.config())
//!         .store(store)
//!         .build()?,
//! );
//!
//! Arc::clone(&manager).start()?;
//! manager.stop(config.config().state_machine.shutdown_timeout()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod connector;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigManager, ConfigurationError, ConnectorConfig};
pub use error::{CoreError, Result};
pub use orchestration::{IterationResult, Outcome, StateMachineManager, StateProcessor};
pub use state_machine::{EntityState, StatefulEntity};
pub use store::{EntityStore, InMemoryEntityStore, QuerySpec};
