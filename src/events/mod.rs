//! # Events
//!
//! Entity lifecycle notifications and their delivery to listeners.

pub mod listener;
pub mod observable;
pub mod types;

// Re-export key types for convenience
pub use listener::{EntityListener, ListenerError, ListenerResult, LoggingListener};
pub use observable::{Observable, ObservableStats};
pub use types::{EntityEvent, Event};
