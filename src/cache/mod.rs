//! In-process caches shared by state processors.

pub mod flow_completion;

pub use flow_completion::{FlowCompletion, FlowCompletionCache};
