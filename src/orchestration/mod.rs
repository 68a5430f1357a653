//! # Orchestration
//!
//! Polling state machine managers that drive entities through their state
//! graphs.
//!
//! ## Architecture
//!
//! - **StateMachineManager**: Leases due entities, runs per-state processors, persists outcomes
//! - **StateProcessor**: Per-state logic returning an explicit [`Outcome`]
//! - **Outcome**: `Advanced`, `Retry` or `Fatal`; failure handling is data, not control flow
//!
//! ## Usage
//!
//! ```rust
//! use dataspace_core::orchestration::{from_fn, Outcome, StateMachineManager};
//! use dataspace_core::state_machine::{StatefulEntity, TransferState};
//! use dataspace_core::store::InMemoryEntityStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryEntityStore::<TransferState, ()>::new(
//!     "node-a",
//!     chrono::Duration::seconds(60),
//! ));
//!
//! let manager = StateMachineManager::<TransferState, ()>::builder("transfer-process")
//!     .store(store)
//!     .processor(
//!         TransferState::Initial,
//!         Arc::new(from_fn(|_entity: &mut StatefulEntity<TransferState, ()>| {
//!             Ok(Outcome::Advanced(TransferState::Provisioning))
//!         })),
//!     )
//!     .build()?;
//!
//! manager
//!     .create(StatefulEntity::with_id("tp-1", TransferState::Initial, (), chrono::Utc::now()))
//!     .await?;
//! let result = manager.run_iteration().await?;
//! assert_eq!(result.advanced, 1);
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod outcome;
pub mod processor;

pub use manager::{IterationResult, StateMachineManager, StateMachineManagerBuilder};
pub use outcome::Outcome;
pub use processor::{from_fn, FnProcessor, StateProcessor};
