//! Construction and wiring errors

use thiserror::Error;

/// A problem found while building one field of an instance.
///
/// These never abort construction: the field keeps its default and the
/// error is returned alongside the instance. Only a failure to resolve
/// the root type is returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeserializeError {
    #[error("No wired package provides type '{type_name}' (at '{path}')")]
    TypeResolution { type_name: String, path: String },

    #[error("Schema mismatch at '{path}': expected {expected}, found {found}")]
    SchemaMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Oneof conflict at '{path}': '{cleared}' cleared from group '{group}'")]
    OneofConflict {
        path: String,
        group: String,
        cleared: String,
    },
}

impl DeserializeError {
    /// Field path the error refers to
    pub fn path(&self) -> &str {
        match self {
            Self::TypeResolution { path, .. }
            | Self::SchemaMismatch { path, .. }
            | Self::OneofConflict { path, .. } => path,
        }
    }
}

/// Startup wiring errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("Package wired twice: {0}")]
    DuplicatePackage(String),

    #[error("Type '{type_name}' referenced by '{referenced_by}' is not provided by any wired package")]
    UnresolvedPackage {
        type_name: String,
        referenced_by: String,
    },
}
