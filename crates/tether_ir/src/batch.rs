//! Patch batches and patch-returning responses
//!
//! A batch carries the ordered patches of one update to one entity. Its
//! change number is the high-water mark of the patches it contains and is
//! what the engine uses to order and deduplicate deliveries.

use crate::patch::MessagePatch;
use crate::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};

/// Where a batch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeSource {
    /// Local edit
    Local,
    /// Remote peer
    Remote,
    /// Server push
    Server,
    /// Persisted storage
    Storage,
}

/// Ordered patches targeting one live entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBatch {
    /// Fully-qualified type of the target entity
    pub message_type: String,
    /// Which live instance the batch targets
    pub entity_id: String,
    /// Patches, applied in listed order
    #[serde(default)]
    pub patches: Vec<MessagePatch>,
    /// High-water mark: the last patch's change number
    pub change_number: u64,
    /// Origin of the batch
    pub source: ChangeSource,
    /// Free-form metadata carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ValueMap>,
}

impl PatchBatch {
    /// Create a new empty batch
    pub fn new(
        message_type: impl Into<String>,
        entity_id: impl Into<String>,
        source: ChangeSource,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            entity_id: entity_id.into(),
            patches: Vec::new(),
            change_number: 0,
            source,
            metadata: None,
        }
    }

    /// Start building a batch with consecutive change numbers
    pub fn builder(
        message_type: impl Into<String>,
        entity_id: impl Into<String>,
        source: ChangeSource,
    ) -> PatchBatchBuilder {
        PatchBatchBuilder::new(message_type, entity_id, source)
    }

    /// Append a patch, raising the high-water mark if needed
    pub fn push(&mut self, patch: MessagePatch) {
        self.change_number = self.change_number.max(patch.change_number);
        self.patches.push(patch);
    }

    /// Add a patch (builder pattern)
    pub fn with_patch(mut self, patch: MessagePatch) -> Self {
        self.push(patch);
        self
    }

    /// Override the batch change number
    pub fn with_change_number(mut self, change_number: u64) -> Self {
        self.change_number = change_number;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(ValueMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// The lowest change number this batch covers.
    ///
    /// The first patch's number when patches are numbered, otherwise the
    /// batch's own high-water mark.
    pub fn first_change_number(&self) -> u64 {
        self.patches
            .first()
            .map(|p| p.change_number)
            .filter(|n| *n > 0)
            .unwrap_or(self.change_number)
    }

    /// Check if the batch has no patches
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Number of patches
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Decode a batch from its JSON wire form
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Encode this batch in its JSON wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Builder for batches authored locally
pub struct PatchBatchBuilder {
    batch: PatchBatch,
    next_change: u64,
    user_id: Option<String>,
    transaction_id: Option<String>,
}

impl PatchBatchBuilder {
    /// Create a new builder
    pub fn new(
        message_type: impl Into<String>,
        entity_id: impl Into<String>,
        source: ChangeSource,
    ) -> Self {
        Self {
            batch: PatchBatch::new(message_type, entity_id, source),
            next_change: 1,
            user_id: None,
            transaction_id: None,
        }
    }

    /// Number patches after the entity's current change number
    pub fn after(mut self, change_number: u64) -> Self {
        self.next_change = change_number + 1;
        self
    }

    /// Stamp subsequent patches with an author
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Stamp subsequent patches with a transaction
    pub fn transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Attach a metadata entry
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.batch = self.batch.with_metadata(key, value);
        self
    }

    /// Add a patch with the next change number
    pub fn patch(mut self, mut patch: MessagePatch) -> Self {
        patch.change_number = self.next_change;
        self.next_change += 1;
        if patch.user_id.is_none() {
            patch.user_id = self.user_id.clone();
        }
        if patch.transaction_id.is_none() {
            patch.transaction_id = self.transaction_id.clone();
        }
        self.batch.push(patch);
        self
    }

    /// Build the batch
    pub fn build(self) -> PatchBatch {
        self.batch
    }
}

/// Result of a call that yields patches instead of a full value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResponse {
    /// Batches to apply, in order
    #[serde(default)]
    pub patch_batches: Vec<PatchBatch>,
    /// Whether the call succeeded
    pub success: bool,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Change number after the call
    #[serde(default)]
    pub new_change_number: u64,
}

impl PatchResponse {
    /// A successful response
    pub fn success(patch_batches: Vec<PatchBatch>) -> Self {
        let new_change_number = patch_batches
            .iter()
            .map(|b| b.change_number)
            .max()
            .unwrap_or(0);
        Self {
            patch_batches,
            success: true,
            error_message: None,
            new_change_number,
        }
    }

    /// A failed response
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            patch_batches: Vec::new(),
            success: false,
            error_message: Some(message.into()),
            new_change_number: 0,
        }
    }

    /// Decode a response from its JSON wire form
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_numbers_patches() {
        let batch = PatchBatch::builder("game.Match", "m1", ChangeSource::Local)
            .after(5)
            .user("u1")
            .patch(MessagePatch::set("title", "Final"))
            .patch(MessagePatch::clear_list("players"))
            .build();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.patches[0].change_number, 6);
        assert_eq!(batch.patches[1].change_number, 7);
        assert_eq!(batch.change_number, 7);
        assert_eq!(batch.first_change_number(), 6);
        assert!(batch.patches.iter().all(|p| p.user_id.as_deref() == Some("u1")));
    }

    #[test]
    fn test_first_change_number_without_patch_numbers() {
        let batch = PatchBatch::new("game.Match", "m1", ChangeSource::Server)
            .with_patch(MessagePatch::set("title", "x"))
            .with_change_number(11);
        assert_eq!(batch.first_change_number(), 11);
    }

    #[test]
    fn test_response_high_water_mark() {
        let b1 = PatchBatch::new("game.Match", "m1", ChangeSource::Server).with_change_number(3);
        let b2 = PatchBatch::new("game.Match", "m2", ChangeSource::Server).with_change_number(8);
        let response = PatchResponse::success(vec![b1, b2]);
        assert!(response.success);
        assert_eq!(response.new_change_number, 8);

        let failed = PatchResponse::failure("boom");
        assert!(!failed.success);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }
}
