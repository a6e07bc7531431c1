//! Runtime settings shared by the core loops.

use std::time::Duration;

/// Autoscaler-wide tuning knobs, loaded from configuration.
#[derive(Debug, Clone)]
pub struct ScalerSettings {
    /// Bound on every per-app metric buffer; oldest entries are dropped
    /// beyond it.
    pub max_metric_list_size: usize,
    /// Samples older than this (millis) are ignored by aggregation and
    /// derived reads.
    pub max_metric_age: i64,
    /// Instances added/removed per scaling step.
    pub static_scaling_size: u32,
    /// Ask the scaling engine for the application name at bind time.
    pub update_app_name_at_binding: bool,
    /// Period of the aggregator loop.
    pub aggregator_interval: Duration,
    /// Period of the scaler loop.
    pub scaler_interval: Duration,
}

impl ScalerSettings {
    /// Coerce out-of-range values to their permitted minimum.
    ///
    /// A static scaling size below 1 becomes 1.
    pub fn sanitized(mut self) -> Self {
        if self.static_scaling_size < 1 {
            self.static_scaling_size = 1;
        }
        self
    }
}

impl Default for ScalerSettings {
    fn default() -> Self {
        Self {
            max_metric_list_size: 100,
            max_metric_age: 60_000,
            static_scaling_size: 1,
            update_app_name_at_binding: false,
            aggregator_interval: Duration::from_secs(30),
            scaler_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scaling_size_coerced_to_one() {
        let settings = ScalerSettings {
            static_scaling_size: 0,
            ..Default::default()
        };
        assert_eq!(settings.sanitized().static_scaling_size, 1);
    }
}
