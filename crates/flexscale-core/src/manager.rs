//! ScalableAppManager — the registry of bound applications.
//!
//! Maps binding id → `ScalableApp`, coordinating creation and removal
//! with the blueprint store and the bus. The list itself is behind a
//! reader-writer lock so the periodic loops can snapshot it while the
//! management API adds and removes entries; per-app state stays behind
//! each app's own mutex and is never touched here.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info};

use flexscale_bus::{encode_message, topics, BindingAction, BindingEvent, MessageBus};
use flexscale_state::{AppBlueprint, Binding, BlueprintStore, StateResult, validate_blueprint};

use crate::app::{epoch_millis, ScalableApp};
use crate::settings::ScalerSettings;

pub struct ScalableAppManager {
    apps: RwLock<Vec<Arc<ScalableApp>>>,
    store: BlueprintStore,
    bus: MessageBus,
    settings: ScalerSettings,
}

impl ScalableAppManager {
    pub fn new(store: BlueprintStore, bus: MessageBus, settings: ScalerSettings) -> Self {
        Self {
            apps: RwLock::new(Vec::new()),
            store,
            bus,
            settings: settings.sanitized(),
        }
    }

    pub fn settings(&self) -> &ScalerSettings {
        &self.settings
    }

    /// Build a defaulted app for a fresh binding.
    pub fn new_app(&self, binding: Binding) -> Arc<ScalableApp> {
        let bp = AppBlueprint::with_defaults(binding);
        // A defaulted blueprint always satisfies validation.
        Arc::new(
            ScalableApp::from_blueprint(&bp, &self.settings)
                .expect("defaulted blueprint failed validation"),
        )
    }

    /// Read all blueprints from the store and register the valid ones.
    ///
    /// Invalid blueprints are logged and skipped; startup never aborts
    /// over a bad record. Returns the number of apps registered.
    pub async fn load_from_store(&self) -> StateResult<usize> {
        info!("importing blueprints from store");
        let blueprints = self.store.find_all()?;
        let mut loaded = 0;

        for bp in blueprints {
            if let Err(e) = validate_blueprint(&bp) {
                error!(
                    binding = %bp.binding.identifier(),
                    error = %e,
                    "skipping invalid blueprint from store"
                );
                continue;
            }
            let app = match ScalableApp::from_blueprint(&bp, &self.settings) {
                Ok(app) => Arc::new(app),
                Err(e) => {
                    error!(
                        binding = %bp.binding.identifier(),
                        error = %e,
                        "skipping unconstructible blueprint from store"
                    );
                    continue;
                }
            };
            if self.add(app.clone(), true).await {
                info!(binding = %app.identifier(), "imported app from store");
                loaded += 1;
            } else {
                debug!(
                    binding = %app.identifier(),
                    "duplicate binding id while importing, keeping the first"
                );
            }
        }
        Ok(loaded)
    }

    /// Register an app if its binding id is free.
    ///
    /// On success a freshly bound app (not `loaded_from_store`) is
    /// persisted, and a binding event is published either way.
    pub async fn add(&self, app: Arc<ScalableApp>, loaded_from_store: bool) -> bool {
        {
            let mut apps = self.apps.write().await;
            if apps.iter().any(|a| a.binding().id == app.binding().id) {
                return false;
            }
            apps.push(app.clone());
        }

        let action = if loaded_from_store {
            BindingAction::Loading
        } else {
            let bp = app.locked_blueprint().await;
            if let Err(e) = self.store.save(&bp) {
                error!(binding = %app.identifier(), error = %e, "failed to persist blueprint");
            }
            info!(binding = %app.identifier(), "bound app");
            BindingAction::Creating
        };
        self.publish_binding_event(action, app.binding());
        true
    }

    /// Remove an app by binding id, deleting its blueprint.
    pub async fn remove(&self, binding_id: &str) -> bool {
        let removed = {
            let mut apps = self.apps.write().await;
            match apps.iter().position(|a| a.binding().id == binding_id) {
                Some(idx) => Some(apps.remove(idx)),
                None => None,
            }
        };

        let Some(app) = removed else {
            return false;
        };
        if let Err(e) = self.store.delete(binding_id) {
            error!(binding = %app.identifier(), error = %e, "failed to delete blueprint");
        }
        self.publish_binding_event(BindingAction::Deleting, app.binding());
        info!(binding = %app.identifier(), "removed app");
        true
    }

    pub async fn get(&self, binding_id: &str) -> Option<Arc<ScalableApp>> {
        let apps = self.apps.read().await;
        apps.iter().find(|a| a.binding().id == binding_id).cloned()
    }

    pub async fn get_by_resource_id(&self, resource_id: &str) -> Option<Arc<ScalableApp>> {
        let apps = self.apps.read().await;
        apps.iter()
            .find(|a| a.binding().resource_id == resource_id)
            .cloned()
    }

    pub async fn contains(&self, binding_id: &str) -> bool {
        self.get(binding_id).await.is_some()
    }

    pub async fn contains_resource_id(&self, resource_id: &str) -> bool {
        self.get_by_resource_id(resource_id).await.is_some()
    }

    pub async fn size(&self) -> usize {
        self.apps.read().await.len()
    }

    /// Snapshot of the registry list (not of per-app state).
    ///
    /// Callers must lock each app before inspecting its state.
    pub async fn flat_copy_of_apps(&self) -> Vec<Arc<ScalableApp>> {
        self.apps.read().await.clone()
    }

    /// Bindings of all registered apps.
    ///
    /// Bindings are immutable once registered, so no per-app lock is
    /// needed here.
    pub async fn list_of_bindings(&self) -> Vec<Binding> {
        let apps = self.apps.read().await;
        apps.iter().map(|a| a.binding().clone()).collect()
    }

    /// Identifier strings of all registered apps, for log output.
    pub async fn list_of_identifiers(&self) -> Vec<String> {
        let apps = self.apps.read().await;
        apps.iter().map(|a| a.identifier()).collect()
    }

    /// Persist an app's current blueprint, locking the app internally.
    ///
    /// Must not be called while holding that app's guard; use
    /// [`Self::save_blueprint`] from inside a critical section.
    pub async fn update_in_store(&self, app: &ScalableApp) -> StateResult<()> {
        let bp = app.locked_blueprint().await;
        self.store.save(&bp)
    }

    /// Persist an already-exported blueprint.
    pub fn save_blueprint(&self, bp: &AppBlueprint) -> StateResult<()> {
        self.store.save(bp)
    }

    fn publish_binding_event(&self, action: BindingAction, binding: &Binding) {
        let event = BindingEvent {
            timestamp: epoch_millis(),
            action,
            binding_id: binding.id.clone(),
            resource_id: binding.resource_id.clone(),
            scaler_id: binding.scaler_id.clone(),
        };
        match encode_message(&event) {
            Ok(payload) => {
                self.bus.publish(topics::BINDING_EVENTS, payload);
            }
            Err(e) => error!(error = %e, "failed to encode binding event"),
        }
    }
}
