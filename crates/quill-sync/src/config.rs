//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Explicit path passed by the application (highest priority)         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/quill/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.quill.notes/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device id, 30s intervals, two public probe targets  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Laptop"
//!
//! [engine]
//! sync_interval_secs = 30
//! remote_timeout_secs = 10
//! max_attempts = 8
//! retry_base_delay_secs = 2
//! retry_max_delay_secs = 300
//! max_concurrent_notes = 4
//!
//! [network]
//! probe_endpoints = ["1.1.1.1:443", "8.8.8.8:53"]
//! probe_interval_secs = 30
//! probe_timeout_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::monitor::MonitorConfig;

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name, recorded as the editor identity on
    /// notes written from this device (e.g., "Laptop", "Work Desktop").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Quill Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Sync cycle behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Interval between periodic sync cycles (seconds).
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Bounded timeout for each remote store call (seconds).
    /// Exceeding it is a transient failure, not a conflict.
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,

    /// Maximum transient-failure attempts per operation before the note is
    /// flagged for manual intervention.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Base delay for exponential retry backoff (seconds).
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    /// Cap on the exponential retry backoff (seconds).
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_secs: u64,

    /// Bounded concurrency: notes synced in parallel within one cycle.
    #[serde(default = "default_max_concurrent_notes")]
    pub max_concurrent_notes: usize,
}

fn default_sync_interval() -> u64 {
    30
}

fn default_remote_timeout() -> u64 {
    10
}

fn default_max_attempts() -> i64 {
    8
}

fn default_retry_base_delay() -> u64 {
    2
}

fn default_retry_max_delay() -> u64 {
    300
}

fn default_max_concurrent_notes() -> usize {
    4
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            sync_interval_secs: default_sync_interval(),
            remote_timeout_secs: default_remote_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay_secs: default_retry_base_delay(),
            retry_max_delay_secs: default_retry_max_delay(),
            max_concurrent_notes: default_max_concurrent_notes(),
        }
    }
}

// =============================================================================
// Network Settings
// =============================================================================

/// Connectivity probing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Endpoints probed each round (`host:port`). At least two independent
    /// endpoints are required so one provider outage cannot fake "offline".
    #[serde(default = "default_probe_endpoints")]
    pub probe_endpoints: Vec<String>,

    /// Interval between probe rounds (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Per-check timeout (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_probe_endpoints() -> Vec<String> {
    vec!["1.1.1.1:443".to_string(), "8.8.8.8:53".to_string()]
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            probe_endpoints: default_probe_endpoints(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

// =============================================================================
// Sync Configuration
// =============================================================================

/// Full sync engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device identity.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Cycle behavior.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Connectivity probing.
    #[serde(default)]
    pub network: NetworkSettings,
}

impl SyncConfig {
    /// Returns the default config file path for this platform, if one can
    /// be determined.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "quill", "quill")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Loads configuration from the given path, or from the platform
    /// default location, falling back to defaults when no file exists.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => {
                warn!("No config directory available, using defaults");
                return SyncConfig::default();
            }
        };

        match Self::load(&path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded sync configuration");
                config
            }
            Err(e) => {
                debug!(path = %path.display(), ?e, "Config not loaded, using defaults");
                SyncConfig::default()
            }
        }
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        info!(path = %path.display(), "Saved sync configuration");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device id must not be empty".into()));
        }

        if self.network.probe_endpoints.len() < 2 {
            return Err(SyncError::InvalidConfig(
                "at least two probe endpoints are required".into(),
            ));
        }

        for endpoint in &self.network.probe_endpoints {
            let port_ok = endpoint
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);

            if !port_ok {
                return Err(SyncError::InvalidConfig(format!(
                    "probe endpoint '{endpoint}' is not a host:port pair"
                )));
            }
        }

        if self.engine.sync_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync_interval_secs must be greater than zero".into(),
            ));
        }

        if self.network.probe_interval_secs == 0 || self.network.probe_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "probe intervals must be greater than zero".into(),
            ));
        }

        if self.engine.max_attempts < 1 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }

        if self.engine.retry_base_delay_secs > self.engine.retry_max_delay_secs {
            return Err(SyncError::InvalidConfig(
                "retry_base_delay_secs must not exceed retry_max_delay_secs".into(),
            ));
        }

        if self.engine.max_concurrent_notes == 0 {
            return Err(SyncError::InvalidConfig(
                "max_concurrent_notes must be at least 1".into(),
            ));
        }

        Ok(())
    }

    // =========================================================================
    // Duration Accessors
    // =========================================================================

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.engine.sync_interval_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.remote_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.engine.retry_base_delay_secs)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.engine.retry_max_delay_secs)
    }

    /// Builds the monitor configuration from the network section.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            endpoints: self.network.probe_endpoints.clone(),
            probe_interval: Duration::from_secs(self.network.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.network.probe_timeout_secs),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.sync_interval_secs, 30);
        assert!(config.network.probe_endpoints.len() >= 2);
    }

    #[test]
    fn test_single_endpoint_rejected() {
        let mut config = SyncConfig::default();
        config.network.probe_endpoints = vec!["1.1.1.1:443".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_endpoint_rejected() {
        let mut config = SyncConfig::default();
        config.network.probe_endpoints =
            vec!["1.1.1.1:443".to_string(), "no-port-here".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_bounds_checked() {
        let mut config = SyncConfig::default();
        config.engine.retry_base_delay_secs = 600;
        config.engine.retry_max_delay_secs = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SyncConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: SyncConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.device.id, config.device.id);
        assert_eq!(parsed.engine.max_attempts, config.engine.max_attempts);
        assert_eq!(
            parsed.network.probe_endpoints,
            config.network.probe_endpoints
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [device]
            id = "dev-1"
            name = "Laptop"

            [engine]
            sync_interval_secs = 10
        "#;

        let config: SyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.name, "Laptop");
        assert_eq!(config.engine.sync_interval_secs, 10);
        // Unspecified fields take defaults.
        assert_eq!(config.engine.max_attempts, 8);
        assert_eq!(config.network.probe_timeout_secs, 5);
    }
}
