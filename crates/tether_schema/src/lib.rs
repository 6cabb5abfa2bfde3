//! # Tether Schema - per-package message metadata
//!
//! Every generated package ships one [`SchemaRegistry`]: a map from
//! fully-qualified message type name to its [`MessageSchema`]. The registry
//! is built once when the package is wired and is read-only afterwards.
//!
//! ```text
//! library.common ──► SchemaRegistry { "library.common.User", "library.common.Metadata" }
//! game           ──► SchemaRegistry { "game.Match", "game.Player" }
//! ```
//!
//! There is no global registry. Types declared in another package are
//! resolved by the object layer, which knows every wired package.
//!
//! ## Key Concepts
//!
//! - **FieldSchema**: name, wire id, kind, nested type and oneof membership of one field
//! - **MessageSchema**: ordered fields of one message type
//! - **SchemaRegistry**: lookups by type name, field name, field id and oneof group

pub mod error;
pub mod registry;
pub mod schema;

pub use error::{Result, SchemaError};
pub use registry::{package_of, SchemaRegistry};
pub use schema::{FieldSchema, FieldType, MessageSchema};
