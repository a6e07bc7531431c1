//! ScalableApp — per-binding aggregate state and its mutex protocol.
//!
//! One `ScalableApp` exists per binding. The binding identity is
//! immutable and lives outside the lock; everything mutable (wrappers,
//! metric buffers, scheduling state) sits behind a single per-app
//! `tokio::sync::Mutex` and is only reachable through the guard, so the
//! "mutex held" invariant of every getter and setter is enforced by the
//! borrow checker. Helpers that lock internally are marked as such and
//! must not be called while a guard is held.

use std::collections::VecDeque;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, MutexGuard};

use flexscale_bus::{ApplicationMetric, ContainerMetric, HttpMetric};
use flexscale_state::{
    AppBlueprint, Binding, ThresholdPolicy, ValidationError, validate_blueprint,
};

use crate::settings::ScalerSettings;
use crate::wrapper::{ComponentWrapper, Dimension, RequestWrapper};

/// Current epoch millis.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Per-binding state container.
pub struct ScalableApp {
    binding: Binding,
    state: Mutex<AppState>,
}

impl ScalableApp {
    /// Build a live app from a validated blueprint.
    ///
    /// Re-runs validation so that construction can never outlive a rule
    /// change: every blueprint that validates constructs, every one
    /// that doesn't is rejected with the failing rule's error kind.
    pub fn from_blueprint(
        bp: &AppBlueprint,
        settings: &ScalerSettings,
    ) -> Result<Self, ValidationError> {
        validate_blueprint(bp)?;

        let policy = |raw: &str| {
            ThresholdPolicy::from_str(raw).map_err(ValidationError::Policy)
        };

        let cpu = ComponentWrapper::new(
            Dimension::Cpu,
            bp.cpu_upper_limit,
            bp.cpu_lower_limit,
            policy(&bp.cpu_threshold_policy)?,
        );
        let ram = ComponentWrapper::new(
            Dimension::Ram,
            bp.ram_upper_limit,
            bp.ram_lower_limit,
            policy(&bp.ram_threshold_policy)?,
        );
        let request = RequestWrapper::new(
            ComponentWrapper::new(
                Dimension::Http,
                bp.request_upper_limit,
                bp.request_lower_limit,
                policy(&bp.request_threshold_policy)?,
            ),
            bp.quotient_scaling_enabled,
        );
        let latency = ComponentWrapper::new(
            Dimension::Latency,
            bp.latency_upper_limit,
            bp.latency_lower_limit,
            policy(&bp.latency_threshold_policy)?,
        );

        let state = AppState {
            cpu,
            ram,
            request,
            latency,
            min_instances: bp.min_instances as u32,
            max_instances: bp.max_instances as u32,
            min_quotient: bp.min_quotient,
            cooldown_time: bp.cooldown_time,
            learning_time_multiplier: bp.learning_time_multiplier,
            scaling_interval_multiplier: bp.scaling_interval_multiplier,
            current_interval_state: bp.current_interval_state,
            last_scaling_time: bp.last_scaling_time,
            learning_start_time: bp.learning_start_time,
            current_instance_count: (bp.min_instances as u32).max(1),
            max_metric_age: settings.max_metric_age,
            max_metric_list_size: settings.max_metric_list_size,
            container_metrics: VecDeque::new(),
            http_metrics: VecDeque::new(),
            application_metrics: VecDeque::new(),
        };

        Ok(Self {
            binding: bp.binding.clone(),
            state: Mutex::new(state),
        })
    }

    /// Immutable binding identity. Safe to read without the lock.
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Short identifier string for log lines.
    pub fn identifier(&self) -> String {
        self.binding.identifier()
    }

    /// Acquire the app's mutex.
    ///
    /// All mutable state is reached through the returned guard; holding
    /// it serializes every read and write for this app.
    pub async fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().await
    }

    /// Snapshot the app's blueprint, locking internally.
    ///
    /// Must not be called while already holding this app's guard.
    pub async fn locked_blueprint(&self) -> AppBlueprint {
        let state = self.lock().await;
        state.blueprint(&self.binding)
    }
}

/// Everything mutable about a scalable app. Only reachable through
/// [`ScalableApp::lock`].
pub struct AppState {
    pub cpu: ComponentWrapper,
    pub ram: ComponentWrapper,
    pub request: RequestWrapper,
    pub latency: ComponentWrapper,

    pub min_instances: u32,
    pub max_instances: u32,
    pub min_quotient: i64,

    /// Minimum elapsed millis between two confirmed scaling actions.
    pub cooldown_time: i64,
    pub learning_time_multiplier: i32,
    pub scaling_interval_multiplier: i32,
    pub current_interval_state: i32,
    pub last_scaling_time: i64,
    pub learning_start_time: i64,

    /// Last instance count reported by the platform (or confirmed by a
    /// scaling order).
    pub current_instance_count: u32,

    pub max_metric_age: i64,
    max_metric_list_size: usize,
    container_metrics: VecDeque<ContainerMetric>,
    http_metrics: VecDeque<HttpMetric>,
    application_metrics: VecDeque<ApplicationMetric>,
}

impl AppState {
    // ── Buffers ────────────────────────────────────────────────────

    /// Append a container metric, dropping the oldest entry when the
    /// buffer is full.
    pub fn add_container_metric(&mut self, metric: ContainerMetric) {
        push_bounded(&mut self.container_metrics, metric, self.max_metric_list_size);
    }

    pub fn add_http_metric(&mut self, metric: HttpMetric) {
        push_bounded(&mut self.http_metrics, metric, self.max_metric_list_size);
    }

    pub fn add_application_metric(&mut self, metric: ApplicationMetric) {
        push_bounded(&mut self.application_metrics, metric, self.max_metric_list_size);
    }

    pub fn reset_container_metrics(&mut self) {
        self.container_metrics.clear();
    }

    pub fn reset_http_metrics(&mut self) {
        self.http_metrics.clear();
    }

    /// Snapshot copy for read-only processing.
    pub fn copy_of_container_metrics(&self) -> Vec<ContainerMetric> {
        self.container_metrics.iter().cloned().collect()
    }

    pub fn copy_of_http_metrics(&self) -> Vec<HttpMetric> {
        self.http_metrics.iter().cloned().collect()
    }

    pub fn copy_of_application_metrics(&self) -> Vec<ApplicationMetric> {
        self.application_metrics.iter().cloned().collect()
    }

    pub fn container_metrics_len(&self) -> usize {
        self.container_metrics.len()
    }

    pub fn http_metrics_len(&self) -> usize {
        self.http_metrics.len()
    }

    pub fn application_metrics_len(&self) -> usize {
        self.application_metrics.len()
    }

    // ── Derived reads ──────────────────────────────────────────────

    /// Collapse the newest container sample of every instance (within
    /// `max_metric_age`) into the CPU scalar. `None` without a window.
    pub fn value_of_cpu(&self, now: i64) -> Option<i64> {
        let samples = self.latest_per_instance(now, |m| m.cpu);
        self.cpu.collapse(&samples)
    }

    /// Same as [`Self::value_of_cpu`] for RAM.
    pub fn value_of_ram(&self, now: i64) -> Option<i64> {
        let samples = self.latest_per_instance(now, |m| m.ram);
        self.ram.collapse(&samples)
    }

    /// Collapse the application-metric window into the request scalar.
    pub fn value_of_requests(&self) -> Option<i64> {
        let samples: Vec<i64> = self
            .application_metrics
            .iter()
            .map(|m| m.requests)
            .collect();
        self.request.component.collapse(&samples)
    }

    /// Collapse the application-metric window into the latency scalar,
    /// skipping entries that never saw a latency sample.
    pub fn value_of_latency(&self) -> Option<i64> {
        let samples: Vec<i64> = self
            .application_metrics
            .iter()
            .map(|m| m.latency)
            .filter(|l| *l >= 0)
            .collect();
        self.latency.collapse(&samples)
    }

    /// Newest non-missing sample per instance index, newest first wins.
    fn latest_per_instance(
        &self,
        now: i64,
        field: impl Fn(&ContainerMetric) -> i64,
    ) -> Vec<i64> {
        let mut latest: Vec<(u32, i64, i64)> = Vec::new();
        for m in &self.container_metrics {
            let value = field(m);
            if value < 0 || m.is_too_old(now, self.max_metric_age) {
                continue;
            }
            match latest.iter_mut().find(|(idx, _, _)| *idx == m.instance_index) {
                Some(entry) if entry.1 < m.timestamp => *entry = (m.instance_index, m.timestamp, value),
                Some(_) => {}
                None => latest.push((m.instance_index, m.timestamp, value)),
            }
        }
        latest.into_iter().map(|(_, _, v)| v).collect()
    }

    // ── Blueprint ──────────────────────────────────────────────────

    /// Export the current configuration as a blueprint.
    pub fn blueprint(&self, binding: &Binding) -> AppBlueprint {
        AppBlueprint {
            binding: binding.clone(),
            cpu_upper_limit: self.cpu.upper_limit,
            cpu_lower_limit: self.cpu.lower_limit,
            cpu_threshold_policy: self.cpu.threshold_policy.to_string(),
            ram_upper_limit: self.ram.upper_limit,
            ram_lower_limit: self.ram.lower_limit,
            ram_threshold_policy: self.ram.threshold_policy.to_string(),
            latency_upper_limit: self.latency.upper_limit,
            latency_lower_limit: self.latency.lower_limit,
            latency_threshold_policy: self.latency.threshold_policy.to_string(),
            request_upper_limit: self.request.component.upper_limit,
            request_lower_limit: self.request.component.lower_limit,
            request_threshold_policy: self.request.component.threshold_policy.to_string(),
            quotient_scaling_enabled: self.request.quotient_scaling_enabled,
            min_quotient: self.min_quotient,
            min_instances: self.min_instances as i32,
            max_instances: self.max_instances as i32,
            cooldown_time: self.cooldown_time,
            learning_time_multiplier: self.learning_time_multiplier,
            scaling_interval_multiplier: self.scaling_interval_multiplier,
            current_interval_state: self.current_interval_state,
            last_scaling_time: self.last_scaling_time,
            learning_start_time: self.learning_start_time,
        }
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, bound: usize) {
    buffer.push_back(item);
    while buffer.len() > bound {
        buffer.pop_front();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flexscale_state::BindingContext;

    pub(crate) fn test_binding(id: &str) -> Binding {
        Binding {
            id: id.to_string(),
            resource_id: format!("resource-{id}"),
            scaler_id: "scaler-0".to_string(),
            service_id: "service-1".to_string(),
            resource_name: None,
            context: BindingContext::default(),
            creation_time: 1_000,
        }
    }

    pub(crate) fn test_app(id: &str) -> ScalableApp {
        let settings = ScalerSettings {
            max_metric_list_size: 5,
            ..Default::default()
        };
        let bp = AppBlueprint::with_defaults(test_binding(id));
        ScalableApp::from_blueprint(&bp, &settings).unwrap()
    }

    fn container_metric(instance: u32, timestamp: i64, cpu: i64, ram: i64) -> ContainerMetric {
        ContainerMetric {
            timestamp,
            app_id: "resource-a".to_string(),
            instance_index: instance,
            cpu,
            ram,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn invalid_blueprint_does_not_construct() {
        let mut bp = AppBlueprint::with_defaults(test_binding("a"));
        bp.cpu_threshold_policy = "median".to_string();
        assert!(matches!(
            ScalableApp::from_blueprint(&bp, &ScalerSettings::default()),
            Err(ValidationError::Policy(_))
        ));
    }

    #[tokio::test]
    async fn buffers_never_exceed_bound() {
        let app = test_app("a");
        let mut state = app.lock().await;

        for i in 0..20 {
            state.add_container_metric(container_metric(0, i, 10, 100));
        }
        assert_eq!(state.container_metrics_len(), 5);

        // The oldest entries were dropped, not the newest.
        let copy = state.copy_of_container_metrics();
        assert_eq!(copy.first().unwrap().timestamp, 15);
        assert_eq!(copy.last().unwrap().timestamp, 19);
    }

    #[tokio::test]
    async fn reset_clears_buffers() {
        let app = test_app("a");
        let mut state = app.lock().await;

        state.add_container_metric(container_metric(0, 1, 10, 100));
        state.add_http_metric(HttpMetric {
            timestamp: 1,
            app_id: "resource-a".to_string(),
            requests: 5,
            latency: 10,
            description: String::new(),
        });

        state.reset_container_metrics();
        state.reset_http_metrics();
        assert_eq!(state.container_metrics_len(), 0);
        assert_eq!(state.http_metrics_len(), 0);
    }

    #[tokio::test]
    async fn cpu_value_uses_newest_sample_per_instance() {
        let app = test_app("a");
        let mut state = app.lock().await;
        let now = 10_000;

        // Instance 0 reported twice; only the newer sample counts.
        state.add_container_metric(container_metric(0, now - 500, 80, 100));
        state.add_container_metric(container_metric(0, now - 100, 40, 100));
        state.add_container_metric(container_metric(1, now - 200, 60, 100));

        // MAX over {40, 60}.
        state.cpu.threshold_policy = ThresholdPolicy::Max;
        assert_eq!(state.value_of_cpu(now), Some(60));

        state.cpu.threshold_policy = ThresholdPolicy::Min;
        assert_eq!(state.value_of_cpu(now), Some(40));

        state.cpu.threshold_policy = ThresholdPolicy::Mean;
        assert_eq!(state.value_of_cpu(now), Some(50));
    }

    #[tokio::test]
    async fn cpu_value_ignores_old_and_missing_samples() {
        let app = test_app("a");
        let mut state = app.lock().await;
        let now = 100_000;
        let age = state.max_metric_age;

        state.add_container_metric(container_metric(0, now - age - 1, 90, 100));
        state.add_container_metric(container_metric(1, now, -1, 100));

        assert_eq!(state.value_of_cpu(now), None);
    }

    #[tokio::test]
    async fn latency_value_skips_missing_entries() {
        let app = test_app("a");
        let mut state = app.lock().await;

        for latency in [-1, 30, 50] {
            state.add_application_metric(ApplicationMetric {
                timestamp: 1_000,
                app_id: "resource-a".to_string(),
                cpu: 10,
                ram: 100,
                requests: 5,
                latency,
                quotient: 5,
                instance_count: 1,
                description: String::new(),
            });
        }

        state.latency.threshold_policy = ThresholdPolicy::Mean;
        assert_eq!(state.value_of_latency(), Some(40));
    }

    #[tokio::test]
    async fn blueprint_roundtrips_through_state() {
        let settings = ScalerSettings::default();
        let mut bp = AppBlueprint::with_defaults(test_binding("a"));
        bp.quotient_scaling_enabled = true;
        bp.min_quotient = 120;
        bp.scaling_interval_multiplier = 3;
        bp.current_interval_state = 2;

        let app = ScalableApp::from_blueprint(&bp, &settings).unwrap();
        let exported = app.locked_blueprint().await;
        assert_eq!(exported, bp);
    }
}
