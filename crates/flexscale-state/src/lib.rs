//! flexscale-state — persisted state for the flexscale autoscaler.
//!
//! Defines the domain types that survive a restart (bindings, app
//! blueprints, threshold policies), the validation rules that gate a
//! blueprint before it may become a live scalable app, and the
//! redb-backed `BlueprintStore`. Blueprints are JSON-serialized into
//! redb's `&[u8]` value column, keyed by binding id. The store supports
//! both on-disk and in-memory backends (the latter for testing).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;
pub mod validate;

pub use error::{StateError, StateResult, ValidationError};
pub use store::BlueprintStore;
pub use types::*;
pub use validate::validate_blueprint;
