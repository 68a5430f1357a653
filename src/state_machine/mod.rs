// State machine module for entity orchestration
//
// Entity kinds share one generic record; each kind contributes a state
// enumeration with ordered codes and a declared transition graph.

pub mod entity;
pub mod errors;
pub mod states;

pub use entity::{EntityPayload, Lease, StatefulEntity};
pub use errors::{TransitionError, TransitionResult};
pub use states::{EntityState, NegotiationState, PolicyMonitorState, TransferState};
