use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GardenConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub weather: WeatherConfig,
    pub supervisor: SupervisorConfig,
    pub pending_deadlines: PendingDeadlinesConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7420".to_string(),
            max_body_bytes: 1_048_576,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub postgres_dsn: Option<String>,
    pub max_connections: u32,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_dsn: None,
            max_connections: 10,
            idle_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self { api_key: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub sweep_interval_ms: u64,
    pub stale_controller_eviction_enabled: bool,
    pub stale_controller_threshold_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 60_000,
            stale_controller_eviction_enabled: false,
            stale_controller_threshold_ms: 300_000,
        }
    }
}

/// Per-family idle ceilings for pending correlations (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingDeadlinesConfig {
    pub irrigation_ms: u64,
    pub moisture_ms: u64,
    pub update_ms: u64,
    pub deletion_ms: u64,
    pub hardware_assignment_ms: u64,
}

impl Default for PendingDeadlinesConfig {
    fn default() -> Self {
        Self {
            irrigation_ms: 120_000,
            moisture_ms: 30_000,
            update_ms: 300_000,
            deletion_ms: 300_000,
            hardware_assignment_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub verbose_logging: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verbose_logging: false,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<GardenConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: GardenConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = GardenConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:7420");
        assert_eq!(config.pending_deadlines.irrigation_ms, 120_000);
        assert!(!config.supervisor.stale_controller_eviction_enabled);
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garden.toml");
        std::fs::write(
            &path,
            "[storage]\npostgres_dsn = \"postgres://localhost/garden\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.storage.postgres_dsn.as_deref(),
            Some("postgres://localhost/garden")
        );
        // Untouched sections still take their defaults.
        assert_eq!(config.server.bind, "0.0.0.0:7420");
    }

    #[test]
    fn missing_file_errors() {
        assert!(load_config("/nonexistent/garden.toml").is_err());
    }
}
