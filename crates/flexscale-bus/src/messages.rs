//! Message records carried on the bus.
//!
//! Every record carries an epoch-millis timestamp and the platform
//! resource id of the application it belongs to. Metric fields use `-1`
//! to mean "not reported" where the platform can omit a sample.

use serde::{Deserialize, Serialize};

/// One CPU/RAM sample for a single container instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerMetric {
    /// Epoch millis at which the sample was taken.
    pub timestamp: i64,
    /// Platform resource id of the application.
    pub app_id: String,
    /// Index of the instance within the application.
    pub instance_index: u32,
    /// CPU load in percent, or -1 if not reported.
    pub cpu: i64,
    /// RAM usage in bytes, or -1 if not reported.
    pub ram: i64,
    #[serde(default)]
    pub description: String,
}

impl ContainerMetric {
    /// Whether the sample is older than `max_age` millis at `now`.
    pub fn is_too_old(&self, now: i64, max_age: i64) -> bool {
        now - self.timestamp > max_age
    }
}

/// One HTTP traffic sample for an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpMetric {
    pub timestamp: i64,
    pub app_id: String,
    /// Requests seen in the sample window.
    pub requests: i64,
    /// Mean latency in millis over the window, or -1 if not reported.
    pub latency: i64,
    #[serde(default)]
    pub description: String,
}

impl HttpMetric {
    pub fn is_too_old(&self, now: i64, max_age: i64) -> bool {
        now - self.timestamp > max_age
    }
}

/// Platform notification about the current instance count of an app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceMetric {
    pub timestamp: i64,
    pub app_id: String,
    pub instance_count: u32,
    #[serde(default)]
    pub description: String,
}

/// Application-level metric derived from one aggregation window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationMetric {
    pub timestamp: i64,
    pub app_id: String,
    /// Mean CPU load in percent across the window's container samples.
    pub cpu: i64,
    /// Mean RAM usage in bytes across the window's container samples.
    pub ram: i64,
    /// Total requests in the window.
    pub requests: i64,
    /// Mean latency in millis over entries that reported one.
    pub latency: i64,
    /// Requests per instance for the window.
    pub quotient: i64,
    /// Instance count the window was observed at.
    pub instance_count: u32,
    #[serde(default)]
    pub description: String,
}

impl ApplicationMetric {
    pub fn is_too_old(&self, now: i64, max_age: i64) -> bool {
        now - self.timestamp > max_age
    }
}

// ── Scaling ───────────────────────────────────────────────────────

/// The component whose threshold drove a scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingReason {
    Cpu,
    Ram,
    Http,
    Latency,
    Quotient,
    None,
}

/// Record of one scaling decision, published on `scaling.log`.
///
/// Carries the component readings that drove the decision so a log
/// consumer can reconstruct it without access to the app's buffers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingLog {
    /// Epoch millis at which the decision was made.
    pub timestamp: i64,
    pub binding_id: String,
    pub app_id: String,
    pub old_instances: u32,
    pub new_instances: u32,
    pub reason: ScalingReason,
    pub description: String,
    /// Component readings at decision time (-1 where no window existed).
    pub current_cpu: i64,
    pub current_ram: i64,
    pub current_requests: i64,
    pub current_latency: i64,
    pub current_quotient: i64,
    /// Limits of the component named in `reason` (0/0 for NONE).
    pub upper_limit: i64,
    pub lower_limit: i64,
}

// ── Binding lifecycle ─────────────────────────────────────────────

/// What happened to a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingAction {
    /// A new binding was created via the management API.
    Creating,
    /// A stored binding was loaded at startup.
    Loading,
    /// A binding was removed.
    Deleting,
}

/// Binding lifecycle event, published on `binding.event`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindingEvent {
    pub timestamp: i64,
    pub action: BindingAction,
    pub binding_id: String,
    pub resource_id: String,
    pub scaler_id: String,
}
