//! Domain types persisted by the flexscale autoscaler.
//!
//! An `AppBlueprint` is the durable configuration of one bound
//! application: binding identity, per-dimension limits and policies,
//! scheduling parameters and the working set. Blueprints are what the
//! store saves and what validation gates; the live `ScalableApp` is
//! reconstructed from them at startup. All types serialize to/from JSON.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Smallest permitted cooldown between two scaling actions (millis).
pub const COOLDOWN_MIN: i64 = 30_000;

/// Smallest permitted learning-time multiplier.
pub const LEARNING_MULTIPLIER_MIN: i32 = 1;

/// Smallest permitted scaling-interval multiplier.
pub const SCALING_INTERVAL_MULTIPLIER_MIN: i32 = 1;

// ── Binding ───────────────────────────────────────────────────────

/// Platform context carried with a binding and echoed to the scaling
/// engine with every order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BindingContext {
    /// Platform identifier (e.g. "cloudfoundry", "kubernetes").
    #[serde(default)]
    pub platform: String,
    /// Free-form platform properties (org, space, cluster, ...).
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Identity of a bound application.
///
/// Immutable after creation except `resource_name`, which may be set
/// once (optionally) while the binding is being established.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    /// Unique binding id.
    pub id: String,
    /// Unique id of the scaled resource on the platform.
    pub resource_id: String,
    /// Id of the autoscaler instance responsible for this binding.
    pub scaler_id: String,
    /// Id of the service instance this binding belongs to.
    pub service_id: String,
    /// Human-readable resource name, resolved at bind time if enabled.
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Platform context forwarded to the scaling engine.
    #[serde(default)]
    pub context: BindingContext,
    /// Epoch millis at which the binding was created.
    pub creation_time: i64,
}

impl Binding {
    /// Short identifier string for log lines.
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.id, self.resource_id)
    }

    /// Set the resource name if it has not been set before.
    ///
    /// Returns false (and leaves the binding untouched) if a name is
    /// already present.
    pub fn set_resource_name(&mut self, name: String) -> bool {
        if self.resource_name.is_some() {
            return false;
        }
        self.resource_name = Some(name);
        true
    }
}

// ── Threshold policy ──────────────────────────────────────────────

/// Reduction applied across per-instance samples before the result is
/// compared against the component limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdPolicy {
    Max,
    Min,
    Mean,
}

impl ThresholdPolicy {
    /// Collapse a set of samples according to the policy.
    ///
    /// Returns `None` for an empty window.
    pub fn apply(&self, samples: &[i64]) -> Option<i64> {
        if samples.is_empty() {
            return None;
        }
        match self {
            ThresholdPolicy::Max => samples.iter().copied().max(),
            ThresholdPolicy::Min => samples.iter().copied().min(),
            ThresholdPolicy::Mean => {
                Some(samples.iter().sum::<i64>() / samples.len() as i64)
            }
        }
    }
}

impl FromStr for ThresholdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(ThresholdPolicy::Max),
            "min" => Ok(ThresholdPolicy::Min),
            "mean" => Ok(ThresholdPolicy::Mean),
            other => Err(format!("unknown threshold policy '{other}'")),
        }
    }
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThresholdPolicy::Max => "max",
            ThresholdPolicy::Min => "min",
            ThresholdPolicy::Mean => "mean",
        };
        f.write_str(s)
    }
}

// ── Blueprint ─────────────────────────────────────────────────────

/// Durable configuration of one scalable app.
///
/// Threshold policies are carried as raw strings so that a blueprint
/// with an unknown policy can still be deserialized and rejected with
/// a proper `ValidationError` instead of a serde error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppBlueprint {
    pub binding: Binding,

    pub cpu_upper_limit: i64,
    pub cpu_lower_limit: i64,
    pub cpu_threshold_policy: String,

    pub ram_upper_limit: i64,
    pub ram_lower_limit: i64,
    pub ram_threshold_policy: String,

    pub latency_upper_limit: i64,
    pub latency_lower_limit: i64,
    pub latency_threshold_policy: String,

    pub request_upper_limit: i64,
    pub request_lower_limit: i64,
    pub request_threshold_policy: String,

    /// Whether the quotient gate suppresses scaling at low traffic.
    pub quotient_scaling_enabled: bool,
    pub min_quotient: i64,

    pub min_instances: i32,
    pub max_instances: i32,

    /// Minimum elapsed millis between two scaling actions.
    pub cooldown_time: i64,
    /// Learning window length, as a multiple of the scaler period.
    pub learning_time_multiplier: i32,
    /// Evaluate this app every Nth scaler tick.
    pub scaling_interval_multiplier: i32,

    /// Working set: ticks since the last evaluation.
    pub current_interval_state: i32,
    /// Epoch millis of the last confirmed scaling action.
    pub last_scaling_time: i64,
    /// Epoch millis at which the learning window started.
    pub learning_start_time: i64,
}

impl AppBlueprint {
    /// Defaulted blueprint for a fresh binding.
    ///
    /// Scheduling times start at the binding's creation time so the
    /// working-set invariants hold from the first validation on.
    pub fn with_defaults(binding: Binding) -> Self {
        let creation = binding.creation_time;
        Self {
            binding,
            cpu_upper_limit: 90,
            cpu_lower_limit: 30,
            cpu_threshold_policy: ThresholdPolicy::Mean.to_string(),
            ram_upper_limit: 734_003_200,
            ram_lower_limit: 134_217_728,
            ram_threshold_policy: ThresholdPolicy::Mean.to_string(),
            latency_upper_limit: 1_000,
            latency_lower_limit: 25,
            latency_threshold_policy: ThresholdPolicy::Mean.to_string(),
            request_upper_limit: 1_000,
            request_lower_limit: 25,
            request_threshold_policy: ThresholdPolicy::Mean.to_string(),
            quotient_scaling_enabled: false,
            min_quotient: 0,
            min_instances: 1,
            max_instances: 10,
            cooldown_time: 60_000,
            learning_time_multiplier: 1,
            scaling_interval_multiplier: 1,
            current_interval_state: 0,
            last_scaling_time: creation,
            learning_start_time: creation,
        }
    }
}
