//! Scaler loop — periodic evaluation and order emission.
//!
//! Every tick, each registered app advances its interval counter and,
//! once the counter reaches the app's scaling-interval multiplier, runs
//! the checker. A non-neutral action turns into an HTTP order to the
//! scaling engine; only a 2xx answer commits `last_scaling_time`, so an
//! unreachable engine simply means the same decision is retried next
//! interval.
//!
//! The app's guard is held across the engine call. That keeps the
//! commit atomic with the confirmed order at the cost of blocking other
//! writers to this one app for the duration; cross-app progress is
//! unaffected since no task ever holds two app mutexes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use flexscale_bus::{encode_message, topics, MessageBus};
use flexscale_engine::ScalingEngineClient;

use crate::app::{epoch_millis, ScalableApp};
use crate::checker::{choose_scaling_action, CheckContext};
use crate::manager::ScalableAppManager;

pub struct Scaler {
    manager: Arc<ScalableAppManager>,
    bus: MessageBus,
    engine: ScalingEngineClient,
    interval: Duration,
}

impl Scaler {
    pub fn new(
        manager: Arc<ScalableAppManager>,
        bus: MessageBus,
        engine: ScalingEngineClient,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            bus,
            engine,
            interval,
        }
    }

    /// Run one pass over every registered app.
    pub async fn check_all(&self) {
        let apps = self.manager.flat_copy_of_apps().await;
        for app in apps {
            self.check_app(&app).await;
        }
    }

    async fn check_app(&self, app: &Arc<ScalableApp>) {
        let mut state = app.lock().await;

        // Each app is only evaluated every Nth tick.
        state.current_interval_state += 1;
        if state.current_interval_state < state.scaling_interval_multiplier {
            return;
        }
        state.current_interval_state = 0;

        let ctx = CheckContext {
            now: epoch_millis(),
            static_scaling_size: self.manager.settings().static_scaling_size,
            scaler_interval: self.interval,
        };
        let action = choose_scaling_action(app.binding(), &state, &ctx);
        if !action.needs_scaling {
            debug!(app = %app.identifier(), reason = %action.description, "no scaling");
            return;
        }

        let binding = app.binding();
        match self
            .engine
            .scale(&binding.resource_id, &binding.context, action.new_instances)
            .await
        {
            Ok(status) if status.is_success() => {
                state.last_scaling_time = ctx.now;
                state.current_instance_count = action.new_instances;
                let log = action.to_log(&state, ctx.now);
                let bp = state.blueprint(binding);
                drop(state);

                info!(
                    app = %app.identifier(),
                    from = action.old_instances,
                    to = action.new_instances,
                    reason = ?action.reason,
                    "scaled"
                );
                match encode_message(&log) {
                    Ok(payload) => {
                        self.bus.publish(topics::SCALING_LOGS, payload);
                    }
                    Err(e) => error!(error = %e, "failed to encode scaling log"),
                }
                if let Err(e) = self.manager.save_blueprint(&bp) {
                    error!(app = %bp.binding.identifier(), error = %e, "failed to persist blueprint");
                }
            }
            Ok(status) => {
                warn!(
                    app = %app.identifier(),
                    %status,
                    "scaling engine rejected the order, retrying next interval"
                );
            }
            Err(e) => {
                warn!(
                    app = %app.identifier(),
                    error = %e,
                    "scaling engine unreachable, retrying next interval"
                );
            }
        }
    }

    /// Run the scaler loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "scaler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.check_all().await;
                }
                _ = shutdown.changed() => {
                    info!("scaler shutting down");
                    break;
                }
            }
        }
    }
}
