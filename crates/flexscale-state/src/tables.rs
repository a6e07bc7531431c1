//! redb table definitions for the flexscale blueprint store.
//!
//! A single table holds JSON-serialized blueprints keyed by binding id.

use redb::TableDefinition;

/// App blueprints keyed by `{binding_id}`.
pub const BLUEPRINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("blueprints");
