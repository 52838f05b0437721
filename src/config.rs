//! Configuration module for the VPN orchestrator
//!
//! TOML-based configuration with serde defaults and validation. Every
//! section is optional; an empty document yields [`Config::default`].

use crate::error::{Result, VpnError};
use crate::provider::engine::{EngineCommand, CONFIG_PLACEHOLDER};
use crate::types::{ConnectionMode, Protocol};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Connection manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Metrics sampling period in milliseconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_ms: u64,
    /// Mode used until the caller changes it
    #[serde(default)]
    pub default_mode: ConnectionMode,
    /// Protocols registered with the manager
    #[serde(default = "default_protocols")]
    pub protocols: Vec<Protocol>,
}

impl ManagerConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            metrics_interval_ms: default_metrics_interval(),
            default_mode: ConnectionMode::default(),
            protocols: default_protocols(),
        }
    }
}

/// External tunneling engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path or name of the xray core binary
    #[serde(default = "default_xray_path")]
    pub xray_path: String,
    /// Engine arguments; `{config}` is replaced by the generated config path
    #[serde(default = "default_xray_args")]
    pub xray_args: Vec<String>,
    /// Delay after spawn before the tunnel is reported up, in milliseconds
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,
    /// Time allowed for a graceful engine exit before it is killed, in milliseconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
    /// Local SOCKS inbound port in proxy mode
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,
    /// Local HTTP inbound port in proxy mode
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Directory for generated engine configs (system temp dir when unset)
    pub config_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Command line for the xray engine
    pub fn xray_command(&self) -> EngineCommand {
        EngineCommand {
            program: self.xray_path.clone(),
            args: self.xray_args.clone(),
            config_dir: self.config_dir.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            xray_path: default_xray_path(),
            xray_args: default_xray_args(),
            grace_period_ms: default_grace_period(),
            stop_timeout_ms: default_stop_timeout(),
            socks_port: default_socks_port(),
            http_port: default_http_port(),
            config_dir: None,
        }
    }
}

/// Settings document location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON document holding saved connections and preferences
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| VpnError::Config(format!("Failed to read config file: {e}")))?;

        <Self as FromStr>::from_str(&contents)
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VpnError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.manager.metrics_interval_ms == 0 {
            return Err(VpnError::Config(
                "Metrics interval cannot be zero".to_string(),
            ));
        }

        if self.manager.protocols.is_empty() {
            return Err(VpnError::Config(
                "At least one protocol must be enabled".to_string(),
            ));
        }

        if self.engine.xray_path.trim().is_empty() {
            return Err(VpnError::Config("Engine path cannot be empty".to_string()));
        }

        if !self
            .engine
            .xray_args
            .iter()
            .any(|arg| arg.contains(CONFIG_PLACEHOLDER))
        {
            return Err(VpnError::Config(format!(
                "Engine arguments must reference {CONFIG_PLACEHOLDER}"
            )));
        }

        if self.engine.socks_port == 0 || self.engine.http_port == 0 {
            return Err(VpnError::Config("Inbound ports cannot be zero".to_string()));
        }

        if self.engine.socks_port == self.engine.http_port {
            return Err(VpnError::Config(
                "SOCKS and HTTP inbound ports must differ".to_string(),
            ));
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(VpnError::Config(format!(
                "Unknown log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = VpnError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| VpnError::Config(format!("Failed to parse TOML: {e}")))
    }
}

// Default value functions for serde
fn default_metrics_interval() -> u64 {
    1000
}

fn default_protocols() -> Vec<Protocol> {
    Protocol::ALL.to_vec()
}

fn default_xray_path() -> String {
    "xray".to_string()
}

fn default_xray_args() -> Vec<String> {
    vec!["run".to_string(), "-c".to_string(), CONFIG_PLACEHOLDER.to_string()]
}

fn default_grace_period() -> u64 {
    1000
}

fn default_stop_timeout() -> u64 {
    2000
}

fn default_socks_port() -> u16 {
    10808
}

fn default_http_port() -> u16 {
    10809
}

fn default_log_level() -> String {
    "info".to_string()
}
