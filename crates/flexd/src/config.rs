//! Daemon configuration.
//!
//! A flat TOML file with one section per concern; every key has a
//! default so an empty file (or no file) yields a runnable development
//! setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use flexscale_core::ScalerSettings;
use flexscale_engine::EngineConfig;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub api: ApiSettings,
    pub store: StoreSettings,
    pub scaler: ScalerSection,
    pub engine: EngineSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Secret the management API requires in the `secret` header.
    pub secret: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            secret: "changeme".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self { port: 8412 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/flexscale/flexscale.redb"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScalerSection {
    pub max_metric_list_size: usize,
    pub max_metric_age_ms: i64,
    pub update_app_name_at_binding: bool,
    pub static_scaling_size: u32,
    pub aggregator_interval_ms: u64,
    pub scaler_interval_ms: u64,
}

impl Default for ScalerSection {
    fn default() -> Self {
        Self {
            max_metric_list_size: 100,
            max_metric_age_ms: 60_000,
            update_app_name_at_binding: false,
            static_scaling_size: 1,
            aggregator_interval_ms: 30_000,
            scaler_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub host: String,
    pub scaling_endpoint: String,
    pub name_endpoint: String,
    pub secret: String,
    pub timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            host: "localhost:8091".to_string(),
            scaling_endpoint: "v1/scale".to_string(),
            name_endpoint: "v1/name".to_string(),
            secret: "changeme".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn scaler_settings(&self) -> ScalerSettings {
        ScalerSettings {
            max_metric_list_size: self.scaler.max_metric_list_size,
            max_metric_age: self.scaler.max_metric_age_ms,
            static_scaling_size: self.scaler.static_scaling_size,
            update_app_name_at_binding: self.scaler.update_app_name_at_binding,
            aggregator_interval: Duration::from_millis(self.scaler.aggregator_interval_ms),
            scaler_interval: Duration::from_millis(self.scaler.scaler_interval_ms),
        }
        .sanitized()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            host: self.engine.host.clone(),
            scaling_endpoint: self.engine.scaling_endpoint.clone(),
            name_endpoint: self.engine.name_endpoint.clone(),
            secret: self.engine.secret.clone(),
            timeout: Duration::from_millis(self.engine.timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.api.port, 8412);
        assert_eq!(settings.scaler.max_metric_list_size, 100);
        assert_eq!(settings.engine.host, "localhost:8091");
    }

    #[test]
    fn sections_override_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [broker]
            secret = "s3cr3t"

            [api]
            port = 9000

            [scaler]
            max_metric_age_ms = 120000
            static_scaling_size = 2

            [engine]
            host = "engine.internal:8091"
            "#,
        )
        .unwrap();

        assert_eq!(settings.broker.secret, "s3cr3t");
        assert_eq!(settings.api.port, 9000);
        assert_eq!(settings.scaler.max_metric_age_ms, 120_000);
        assert_eq!(settings.scaler_settings().static_scaling_size, 2);
        assert_eq!(settings.engine_config().host, "engine.internal:8091");
        // Untouched sections keep their defaults.
        assert_eq!(settings.scaler.max_metric_list_size, 100);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flexd.toml");
        std::fs::write(&path, "[api]\nport = 7777\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.api.port, 7777);
    }

    #[test]
    fn zero_static_scaling_size_sanitized() {
        let settings: Settings =
            toml::from_str("[scaler]\nstatic_scaling_size = 0\n").unwrap();
        assert_eq!(settings.scaler_settings().static_scaling_size, 1);
    }
}
