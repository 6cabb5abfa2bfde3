//! Schema loading errors

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Errors raised while building or loading a schema registry.
///
/// All of these are configuration problems detected at wiring time;
/// lookups on a built registry never fail.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Duplicate message type: {0}")]
    DuplicateType(String),

    #[error("Duplicate field name '{field}' in {message}")]
    DuplicateFieldName { message: String, field: String },

    #[error("Duplicate field id {id} in {message}")]
    DuplicateFieldId { message: String, id: u32 },

    #[error("Field '{field}' in {message} is message-typed but names no message type")]
    MissingMessageType { message: String, field: String },

    #[error("Field '{field}' in {message} cannot hold {element} elements")]
    InvalidElementType {
        message: String,
        field: String,
        element: String,
    },

    #[error("Message {type_name} is not declared in package {package}")]
    ForeignType { type_name: String, package: String },

    #[error("Registry key {key} does not match message name {full_name}")]
    KeyMismatch { key: String, full_name: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
