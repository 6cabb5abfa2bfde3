//! Patch addressing errors

use tether_ir::{PatchOperation, PathError};
use thiserror::Error;

/// Why a patch could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressReason {
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Unknown field '{field}' on {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("'{0}' is not a sequence or mapping")]
    NotAContainer(String),

    #[error("Field '{field}': expected {expected}, found {found}")]
    KindMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("No entry for key '{0}'")]
    MissingKey(String),

    #[error("Missing operand: {0}")]
    MissingOperand(&'static str),

    #[error("Value rejected: {0}")]
    InvalidValue(String),

    #[error("No wired package provides '{0}'")]
    TypeResolution(String),
}

/// A patch that was skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Patch #{patch_index} ({operation}) at '{field_path}': {reason}")]
pub struct PatchAddressError {
    /// Position of the patch in its batch
    pub patch_index: usize,
    pub field_path: String,
    pub operation: PatchOperation,
    pub reason: AddressReason,
}
