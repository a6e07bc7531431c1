//! BlueprintStore — redb-backed persistence for app blueprints.
//!
//! Key = binding id, value = JSON-serialized `AppBlueprint`. The store
//! is the durable half of the app registry: the manager saves on bind
//! and on every confirmed scaling action, deletes on unbind, and reads
//! everything back at startup.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::BLUEPRINTS;
use crate::types::AppBlueprint;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe blueprint store backed by redb.
#[derive(Clone)]
pub struct BlueprintStore {
    db: Arc<Database>,
}

impl BlueprintStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "blueprint store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory blueprint store opened");
        Ok(store)
    }

    /// Create the table if it doesn't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(BLUEPRINTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update a blueprint under its binding id.
    pub fn save(&self, bp: &AppBlueprint) -> StateResult<()> {
        let key = bp.binding.id.clone();
        let value = serde_json::to_vec(bp).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(BLUEPRINTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "blueprint stored");
        Ok(())
    }

    /// Get a blueprint by binding id.
    pub fn get(&self, binding_id: &str) -> StateResult<Option<AppBlueprint>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BLUEPRINTS).map_err(map_err!(Table))?;
        match table.get(binding_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let bp: AppBlueprint =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(bp))
            }
            None => Ok(None),
        }
    }

    /// List all stored blueprints.
    pub fn find_all(&self) -> StateResult<Vec<AppBlueprint>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BLUEPRINTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let bp: AppBlueprint =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(bp);
        }
        Ok(results)
    }

    /// Delete a blueprint by binding id. Returns true if it existed.
    pub fn delete(&self, binding_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(BLUEPRINTS).map_err(map_err!(Table))?;
            existed = table.remove(binding_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%binding_id, existed, "blueprint deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Binding, BindingContext};

    fn test_blueprint(id: &str) -> AppBlueprint {
        AppBlueprint::with_defaults(Binding {
            id: id.to_string(),
            resource_id: format!("resource-{id}"),
            scaler_id: "scaler-0".to_string(),
            service_id: "service-1".to_string(),
            resource_name: None,
            context: BindingContext::default(),
            creation_time: 1_000,
        })
    }

    #[test]
    fn save_and_get() {
        let store = BlueprintStore::open_in_memory().unwrap();
        let bp = test_blueprint("b-1");

        store.save(&bp).unwrap();
        let loaded = store.get("b-1").unwrap();

        assert_eq!(loaded, Some(bp));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = BlueprintStore::open_in_memory().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn find_all_lists_everything() {
        let store = BlueprintStore::open_in_memory().unwrap();
        store.save(&test_blueprint("b-1")).unwrap();
        store.save(&test_blueprint("b-2")).unwrap();
        store.save(&test_blueprint("b-3")).unwrap();

        assert_eq!(store.find_all().unwrap().len(), 3);
    }

    #[test]
    fn save_updates_in_place() {
        let store = BlueprintStore::open_in_memory().unwrap();
        let mut bp = test_blueprint("b-1");
        store.save(&bp).unwrap();

        bp.max_instances = 20;
        bp.last_scaling_time = 5_000;
        store.save(&bp).unwrap();

        let loaded = store.get("b-1").unwrap().unwrap();
        assert_eq!(loaded.max_instances, 20);
        assert_eq!(loaded.last_scaling_time, 5_000);
        assert_eq!(store.find_all().unwrap().len(), 1);
    }

    #[test]
    fn delete_reports_existence() {
        let store = BlueprintStore::open_in_memory().unwrap();
        store.save(&test_blueprint("b-1")).unwrap();

        assert!(store.delete("b-1").unwrap());
        assert!(!store.delete("b-1").unwrap());
        assert!(store.get("b-1").unwrap().is_none());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = BlueprintStore::open(&db_path).unwrap();
            store.save(&test_blueprint("b-1")).unwrap();
        }

        // Reopen the same database file.
        let store = BlueprintStore::open(&db_path).unwrap();
        let bp = store.get("b-1").unwrap();
        assert!(bp.is_some());
        assert_eq!(bp.unwrap().binding.resource_id, "resource-b-1");
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let store = BlueprintStore::open_in_memory().unwrap();
        let mut bp = test_blueprint("b-1");
        bp.quotient_scaling_enabled = true;
        bp.min_quotient = 300;
        bp.current_interval_state = 1;
        bp.scaling_interval_multiplier = 2;
        bp.binding.resource_name = Some("checkout".to_string());
        bp.binding
            .context
            .properties
            .insert("space".to_string(), "prod".to_string());

        store.save(&bp).unwrap();
        let loaded = store.get("b-1").unwrap().unwrap();

        assert_eq!(loaded, bp);
        assert!(crate::validate::validate_blueprint(&loaded).is_ok());
    }
}
