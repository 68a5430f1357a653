//! # Commands
//!
//! Out-of-band control of entities (cancel, deprovision, custom operations)
//! through explicitly registered handlers.
//!
//! ## Usage
//!
//! ```rust
//! use dataspace_core::commands::{CancelTransferHandler, CommandHandlerRegistry, EntityCommand};
//! use dataspace_core::events::Observable;
//! use dataspace_core::state_machine::{StatefulEntity, TransferState};
//! use dataspace_core::store::{EntityStore, InMemoryEntityStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryEntityStore::<TransferState, ()>::new(
//!     "node-a",
//!     chrono::Duration::seconds(60),
//! ));
//! store
//!     .save(&StatefulEntity::with_id("tp-1", TransferState::Started, (), chrono::Utc::now()))
//!     .await?;
//!
//! let registry = CommandHandlerRegistry::<TransferState, ()>::new(
//!     store,
//!     Observable::new(),
//!     chrono::Duration::seconds(60),
//! );
//! registry.register(Arc::new(CancelTransferHandler))?;
//!
//! let result = registry.execute(&EntityCommand::cancel("tp-1", "no longer needed")).await?;
//! assert!(result.is_executed());
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod handler;
pub mod handlers;
pub mod registry;

pub use command::{CommandResult, CommandType, EntityCommand};
pub use handler::{CommandEffect, CommandHandler};
pub use handlers::{CancelNegotiationHandler, CancelTransferHandler, DeprovisionTransferHandler};
pub use registry::CommandHandlerRegistry;

use crate::events::ListenerError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that prevent a command from completing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("A handler for command type {command_type} is already registered")]
    DuplicateHandler { command_type: CommandType },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),
}
