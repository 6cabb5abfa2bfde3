//! Sync errors and warnings

use crate::transport::TransportError;
use tether_object::{DeserializeError, WiringError};
use thiserror::Error;

/// Errors that stop a batch or an engine operation
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Entity '{entity_id}' is a {expected}, batch targets {found}")]
    TypeMismatch {
        entity_id: String,
        expected: String,
        found: String,
    },

    #[error("Batch has {len} patches (limit {max})")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Deserialize error: {0}")]
    Deserialize(#[from] DeserializeError),

    #[error("Wiring error: {0}")]
    Wiring(#[from] WiringError),

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Conditions reported with a batch that was still applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncWarning {
    /// Change numbers were skipped between the entity and the batch
    #[error("Sequence gap: expected change {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },
}
