//! Message patches - addressed mutations of live instances
//!
//! A patch represents a single mutation of one location in a message.
//! Patches are grouped into batches and applied in order by the engine.

use crate::path::{FieldPath, PathError};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of mutation a patch performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchOperation {
    /// Replace the value at the path
    Set,
    /// Insert `value` at `index`, shifting later elements right
    InsertList,
    /// Remove the element at `index`, shifting later elements left
    RemoveList,
    /// Move the element at `oldIndex` to `index`
    MoveList,
    /// Insert or overwrite `key → value`
    InsertMap,
    /// Delete `key`; no-op if absent
    RemoveMap,
    /// Truncate a sequence to empty
    ClearList,
    /// Remove every entry of a mapping
    ClearMap,
}

impl PatchOperation {
    /// Check if the operation targets a sequence field
    pub fn targets_list(&self) -> bool {
        matches!(
            self,
            Self::InsertList | Self::RemoveList | Self::MoveList | Self::ClearList
        )
    }

    /// Check if the operation targets a mapping field
    pub fn targets_map(&self) -> bool {
        matches!(self, Self::InsertMap | Self::RemoveMap | Self::ClearMap)
    }

    /// Check if the operation carries a new value
    pub fn requires_value(&self) -> bool {
        matches!(self, Self::InsertList | Self::InsertMap)
    }

    /// Wire spelling of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::InsertList => "INSERT_LIST",
            Self::RemoveList => "REMOVE_LIST",
            Self::MoveList => "MOVE_LIST",
            Self::InsertMap => "INSERT_MAP",
            Self::RemoveMap => "REMOVE_MAP",
            Self::ClearList => "CLEAR_LIST",
            Self::ClearMap => "CLEAR_MAP",
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    /// The mutation
    pub operation: PatchOperation,
    /// Address of the mutated location
    pub field_path: String,
    /// New value (SET, INSERT_LIST, INSERT_MAP). `null` on SET unsets the field.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    /// Target sequence position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Source sequence position for MOVE_LIST
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_index: Option<usize>,
    /// Target mapping key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Per-entity monotonic change number
    #[serde(default)]
    pub change_number: u64,
    /// Creation time in milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: u64,
    /// Author of the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Transaction the change belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl MessagePatch {
    /// Create a new patch stamped with the current time
    pub fn new(operation: PatchOperation, field_path: impl Into<String>) -> Self {
        Self {
            operation,
            field_path: field_path.into(),
            value: Value::Null,
            index: None,
            old_index: None,
            key: None,
            change_number: 0,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            user_id: None,
            transaction_id: None,
        }
    }

    /// Replace the value at a path
    pub fn set(field_path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Self::new(PatchOperation::Set, field_path)
        }
    }

    /// Insert into a sequence
    pub fn insert_list(field_path: impl Into<String>, index: usize, value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            index: Some(index),
            ..Self::new(PatchOperation::InsertList, field_path)
        }
    }

    /// Remove from a sequence
    pub fn remove_list(field_path: impl Into<String>, index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::new(PatchOperation::RemoveList, field_path)
        }
    }

    /// Move within a sequence
    pub fn move_list(field_path: impl Into<String>, old_index: usize, index: usize) -> Self {
        Self {
            index: Some(index),
            old_index: Some(old_index),
            ..Self::new(PatchOperation::MoveList, field_path)
        }
    }

    /// Insert or overwrite a mapping entry
    pub fn insert_map(
        field_path: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            value: value.into(),
            key: Some(key.into()),
            ..Self::new(PatchOperation::InsertMap, field_path)
        }
    }

    /// Remove a mapping entry
    pub fn remove_map(field_path: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new(PatchOperation::RemoveMap, field_path)
        }
    }

    /// Empty a sequence
    pub fn clear_list(field_path: impl Into<String>) -> Self {
        Self::new(PatchOperation::ClearList, field_path)
    }

    /// Empty a mapping
    pub fn clear_map(field_path: impl Into<String>) -> Self {
        Self::new(PatchOperation::ClearMap, field_path)
    }

    /// Set the change number
    pub fn with_change_number(mut self, change_number: u64) -> Self {
        self.change_number = change_number;
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the authoring user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the transaction
    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Parse the field path
    pub fn path(&self) -> Result<FieldPath, PathError> {
        FieldPath::parse(&self.field_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_builders() {
        let patch = MessagePatch::move_list("players", 3, 0).with_change_number(9);
        assert_eq!(patch.operation, PatchOperation::MoveList);
        assert_eq!(patch.old_index, Some(3));
        assert_eq!(patch.index, Some(0));
        assert_eq!(patch.change_number, 9);
        assert!(patch.operation.targets_list());
        assert!(!patch.operation.targets_map());
        assert!(!patch.operation.requires_value());
        assert!(PatchOperation::InsertMap.requires_value());
    }

    #[test]
    fn test_wire_shape() {
        let patch = MessagePatch::insert_map("places", "tile_123", Value::object())
            .with_change_number(4)
            .with_timestamp(1000)
            .with_user("u1");

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            json!({
                "operation": "INSERT_MAP",
                "fieldPath": "places",
                "value": {},
                "key": "tile_123",
                "changeNumber": 4,
                "timestamp": 1000,
                "userId": "u1"
            })
        );
    }

    #[test]
    fn test_decode_from_wire() {
        let patch: MessagePatch = serde_json::from_value(json!({
            "operation": "MOVE_LIST",
            "fieldPath": "players",
            "index": 0,
            "oldIndex": 2,
            "changeNumber": 12,
            "timestamp": 5,
            "transactionId": "tx-1"
        }))
        .unwrap();

        assert_eq!(patch.operation, PatchOperation::MoveList);
        assert_eq!(patch.old_index, Some(2));
        assert_eq!(patch.transaction_id.as_deref(), Some("tx-1"));
        assert!(patch.value.is_null());
    }

    #[test]
    fn test_operation_spelling() {
        for op in [
            PatchOperation::Set,
            PatchOperation::InsertList,
            PatchOperation::RemoveList,
            PatchOperation::MoveList,
            PatchOperation::InsertMap,
            PatchOperation::RemoveMap,
            PatchOperation::ClearList,
            PatchOperation::ClearMap,
        ] {
            assert_eq!(serde_json::to_value(op).unwrap(), json!(op.as_str()));
        }
    }
}
