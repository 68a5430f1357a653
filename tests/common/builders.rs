//! Shared fixtures: stores on a manual clock and ready-made entities.

use chrono::{Duration, Utc};
use dataspace_core::clock::ManualClock;
use dataspace_core::state_machine::{StatefulEntity, TransferState};
use dataspace_core::store::InMemoryEntityStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const LEASE_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPayload {
    pub asset_id: String,
    pub priority: u32,
}

impl AssetPayload {
    pub fn new(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            priority: 0,
        }
    }
}

pub type TestStore = InMemoryEntityStore<TransferState, AssetPayload>;
pub type TestEntity = StatefulEntity<TransferState, AssetPayload>;

/// Store owned by `owner_id` that reads time from a manual clock
pub fn store_with_clock(owner_id: &str) -> (Arc<TestStore>, ManualClock) {
    let clock = ManualClock::new(Utc::now());
    let store = TestStore::with_clock(owner_id, Duration::seconds(LEASE_SECONDS), Arc::new(clock.clone()));
    (Arc::new(store), clock)
}

pub fn transfer(id: &str, state: TransferState, clock: &ManualClock) -> TestEntity {
    use dataspace_core::clock::Clock;
    StatefulEntity::with_id(id, state, AssetPayload::new(&format!("asset-{id}")), clock.now())
}
