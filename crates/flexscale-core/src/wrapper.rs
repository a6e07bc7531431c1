//! Component wrappers — configuration and derived-value logic for one
//! scalable dimension of one application.
//!
//! The four dimensions (CPU, RAM, HTTP requests, latency) share a
//! common shape: a pair of limits and a threshold policy that collapses
//! per-instance samples into the scalar compared against them. The
//! request dimension additionally carries the traffic quotient used to
//! gate scaling at very low load.

use flexscale_bus::ScalingReason;
use flexscale_state::ThresholdPolicy;

/// A scalable dimension of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Cpu,
    Ram,
    Http,
    Latency,
}

impl Dimension {
    /// The scaling reason reported when this dimension drives a decision.
    pub fn reason(&self) -> ScalingReason {
        match self {
            Dimension::Cpu => ScalingReason::Cpu,
            Dimension::Ram => ScalingReason::Ram,
            Dimension::Http => ScalingReason::Http,
            Dimension::Latency => ScalingReason::Latency,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Dimension::Cpu => "cpu load",
            Dimension::Ram => "ram usage",
            Dimension::Http => "http requests",
            Dimension::Latency => "latency",
        }
    }
}

/// Limits and policy for one dimension.
#[derive(Debug, Clone)]
pub struct ComponentWrapper {
    dimension: Dimension,
    pub upper_limit: i64,
    pub lower_limit: i64,
    pub threshold_policy: ThresholdPolicy,
}

impl ComponentWrapper {
    pub fn new(
        dimension: Dimension,
        upper_limit: i64,
        lower_limit: i64,
        threshold_policy: ThresholdPolicy,
    ) -> Self {
        Self {
            dimension,
            upper_limit,
            lower_limit,
            threshold_policy,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Whether a derived value stays at or below the upper limit.
    pub fn within_upper(&self, value: i64) -> bool {
        value <= self.upper_limit
    }

    /// Whether a derived value stays at or above the lower limit.
    pub fn within_lower(&self, value: i64) -> bool {
        value >= self.lower_limit
    }

    /// Collapse a sample window according to the threshold policy.
    pub fn collapse(&self, samples: &[i64]) -> Option<i64> {
        self.threshold_policy.apply(samples)
    }
}

/// The request dimension: a component wrapper plus the traffic quotient.
#[derive(Debug, Clone)]
pub struct RequestWrapper {
    pub component: ComponentWrapper,
    /// Requests per instance over the last aggregation window.
    pub quotient: i64,
    /// Whether the quotient gate may suppress scaling.
    pub quotient_scaling_enabled: bool,
}

impl RequestWrapper {
    pub fn new(component: ComponentWrapper, quotient_scaling_enabled: bool) -> Self {
        Self {
            component,
            quotient: 0,
            quotient_scaling_enabled,
        }
    }

    pub fn reset_quotient(&mut self) {
        self.quotient = 0;
    }
}
