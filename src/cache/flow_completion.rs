use crate::config::FlowCacheConfig;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tracing::trace;

/// How a data flow finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCompletion {
    pub completed_at: DateTime<Utc>,
    /// Failure reported by the data plane, `None` on success
    pub error: Option<String>,
}

impl FlowCompletion {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Bounded record of finished data flows, keyed by data-flow id.
///
/// Writers take the exclusive lock for one insert and evict the least recently
/// inserted entry once capacity is exceeded. Readers use `peek` under the
/// shared lock so lookups never reorder entries.
#[derive(Debug)]
pub struct FlowCompletionCache {
    entries: RwLock<LruCache<String, FlowCompletion>>,
}

impl FlowCompletionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn from_config(config: &FlowCacheConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn record_completed(&self, flow_id: impl Into<String>, at: DateTime<Utc>) {
        self.insert(
            flow_id.into(),
            FlowCompletion {
                completed_at: at,
                error: None,
            },
        );
    }

    pub fn record_failed(&self, flow_id: impl Into<String>, reason: impl Into<String>, at: DateTime<Utc>) {
        self.insert(
            flow_id.into(),
            FlowCompletion {
                completed_at: at,
                error: Some(reason.into()),
            },
        );
    }

    fn insert(&self, flow_id: String, completion: FlowCompletion) {
        let evicted = self.entries.write().push(flow_id.clone(), completion);
        if let Some((evicted_id, _)) = evicted.filter(|(id, _)| *id != flow_id) {
            trace!(flow_id = %evicted_id, "Evicted flow completion");
        }
    }

    pub fn get(&self, flow_id: &str) -> Option<FlowCompletion> {
        self.entries.read().peek(flow_id).cloned()
    }

    pub fn remove(&self, flow_id: &str) -> Option<FlowCompletion> {
        self.entries.write().pop(flow_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.read().cap().get()
    }
}
