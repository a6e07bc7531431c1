//! Topic names used on the message bus.

/// Per-container CPU/RAM samples from the platform.
pub const CONTAINER_METRICS: &str = "metric.container";

/// Per-app HTTP request/latency samples from the router.
pub const HTTP_METRICS: &str = "metric.http";

/// Platform instance-count notifications.
pub const INSTANCE_METRICS: &str = "metric.instance";

/// Aggregated application metrics (autoscaler output).
pub const APPLICATION_METRICS: &str = "metric.application";

/// Scaling decisions (autoscaler output).
pub const SCALING_LOGS: &str = "scaling.log";

/// Binding lifecycle events (autoscaler output).
pub const BINDING_EVENTS: &str = "binding.event";
