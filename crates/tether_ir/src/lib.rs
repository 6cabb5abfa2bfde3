//! # Tether IR - Boundary Values & Patch Wire Model
//!
//! The compiled module and the host exchange plain structured data only.
//! This crate defines that data and the patches that mutate live state.
//!
//! ## Architecture
//!
//! ```text
//! Server ──┐
//! Storage ─┼──► PatchBatch { entityId, changeNumber, patches[] } ──► Sync Engine
//! Peer ────┤
//! Local ───┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Value**: tagged boundary payload (null / bool / number / string / array / object)
//! - **FieldPath**: parsed `players[2].name` / `places['tile_123'].latitude` addresses
//! - **MessagePatch**: a single addressed mutation
//! - **PatchBatch**: ordered patches for one entity with a change-number high-water mark
//! - **PatchResponse**: result of a call that yields patches instead of a value

pub mod batch;
pub mod patch;
pub mod path;
pub mod value;

pub use batch::{ChangeSource, PatchBatch, PatchBatchBuilder, PatchResponse};
pub use patch::{MessagePatch, PatchOperation};
pub use path::{FieldPath, PathError, PathSegment};
pub use value::{Value, ValueMap};
