//! Aggregator — collapses buffered samples into application metrics.
//!
//! Periodic task. For every registered app it drains the container and
//! HTTP buffers, averages the fresh samples and refreshes the traffic
//! quotient. When the window saw both CPU and RAM samples it produces
//! an `ApplicationMetric`, appended to the app's own window and
//! published on the bus. A window with only one of the two produces
//! nothing: a scaling decision needs joint CPU+RAM presence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use flexscale_bus::{encode_message, topics, ApplicationMetric, MessageBus};
use flexscale_state::Binding;

use crate::app::{epoch_millis, AppState};
use crate::manager::ScalableAppManager;

pub struct Aggregator {
    manager: Arc<ScalableAppManager>,
    bus: MessageBus,
    interval: Duration,
}

impl Aggregator {
    pub fn new(manager: Arc<ScalableAppManager>, bus: MessageBus, interval: Duration) -> Self {
        Self {
            manager,
            bus,
            interval,
        }
    }

    /// Run one aggregation pass over every registered app.
    pub async fn aggregate_all(&self) {
        let apps = self.manager.flat_copy_of_apps().await;
        let now = epoch_millis();

        for app in apps {
            let metric = {
                let mut state = app.lock().await;
                aggregate(app.binding(), &mut state, now)
            };
            if let Some(metric) = metric {
                debug!(app = %metric.app_id, cpu = metric.cpu, ram = metric.ram, "aggregated window");
                match encode_message(&metric) {
                    Ok(payload) => {
                        self.bus.publish(topics::APPLICATION_METRICS, payload);
                    }
                    Err(e) => error!(error = %e, "failed to encode application metric"),
                }
            }
        }
    }

    /// Run the aggregation loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "aggregator started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.aggregate_all().await;
                }
                _ = shutdown.changed() => {
                    info!("aggregator shutting down");
                    break;
                }
            }
        }
    }
}

/// Collapse one app's buffered samples into an application metric.
///
/// Both buffers are drained unconditionally; the quotient is refreshed
/// from the window's request total. Returns `None` unless the window
/// saw at least one CPU and one RAM sample. The produced metric is
/// already appended to the app's application-metric window.
pub fn aggregate(binding: &Binding, state: &mut AppState, now: i64) -> Option<ApplicationMetric> {
    let max_age = state.max_metric_age;

    let mut cpu_sum: i64 = 0;
    let mut cpu_count: i64 = 0;
    let mut ram_sum: i64 = 0;
    let mut ram_count: i64 = 0;
    for m in state.copy_of_container_metrics() {
        if m.is_too_old(now, max_age) {
            continue;
        }
        if m.cpu >= 0 {
            cpu_sum += m.cpu;
            cpu_count += 1;
        }
        if m.ram >= 0 {
            ram_sum += m.ram;
            ram_count += 1;
        }
    }
    state.reset_container_metrics();

    let mut requests: i64 = 0;
    let mut latency_sum: i64 = 0;
    let mut latency_count: i64 = 0;
    for m in state.copy_of_http_metrics() {
        if m.is_too_old(now, max_age) || m.requests <= 0 {
            continue;
        }
        requests += m.requests;
        if m.latency >= 0 {
            latency_sum += m.latency;
            latency_count += 1;
        }
    }
    state.reset_http_metrics();

    let instance_count = state.current_instance_count;
    state.request.quotient = if instance_count > 0 {
        requests / instance_count as i64
    } else {
        0
    };

    if cpu_count == 0 || ram_count == 0 {
        return None;
    }

    let metric = ApplicationMetric {
        timestamp: now,
        app_id: binding.resource_id.clone(),
        cpu: cpu_sum / cpu_count,
        ram: ram_sum / ram_count,
        requests,
        latency: if latency_count > 0 {
            latency_sum / latency_count
        } else {
            -1
        },
        quotient: state.request.quotient,
        instance_count,
        description: String::new(),
    };
    state.add_application_metric(metric.clone());
    Some(metric)
}
