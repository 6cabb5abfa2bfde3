//! # Tether Patch - applying patches to live instances
//!
//! Resolves each patch's field path against the schemas of the traversed
//! message types and mutates exactly the addressed location.
//!
//! ```text
//! players[2].name ──► Match.players (REPEATED game.Player)
//!                         └─► [2] (index < len)
//!                               └─► Player.name (STRING) ──► SET
//! ```
//!
//! A patch that cannot be addressed is skipped and reported; the rest of
//! the batch still applies. Ordering and staleness belong to the caller.

pub mod apply;
pub mod error;
mod structural;

pub use apply::{PatchApplier, PatchReport};
pub use error::{AddressReason, PatchAddressError};
