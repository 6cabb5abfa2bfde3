//! Sync engine configuration

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use tether_object::ObjectConfig;

/// Configuration for the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Batches with more patches are rejected
    pub max_patches_per_batch: usize,
    /// Capacity of the transport inbox; deliveries beyond it are dropped
    pub inbox_capacity: usize,
    /// Log stale batch discards at debug level
    pub log_stale_batches: bool,
    /// Object model settings used when the engine wires its own packages
    pub object: ObjectConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_patches_per_batch: 10000,
            inbox_capacity: 1000,
            log_stale_batches: true,
            object: ObjectConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the per-batch patch limit (builder pattern)
    pub fn with_max_patches_per_batch(mut self, max: usize) -> Self {
        self.max_patches_per_batch = max;
        self
    }

    /// Set the inbox capacity (builder pattern)
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Set the object model settings (builder pattern)
    pub fn with_object(mut self, object: ObjectConfig) -> Self {
        self.object = object;
        self
    }
}
