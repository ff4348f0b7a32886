//! WolfHA Configuration
//!
//! This module provides configuration structures for the WolfHA
//! failover arbitration daemon.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Main WolfHA configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfHaConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Failover group configuration
    pub backup: BackupConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier (used in logs and the status API)
    pub id: String,

    /// Host to bind the keep-alive socket on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Failover group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Hosts participating in the failover group
    #[serde(default)]
    pub members: Vec<String>,

    /// Port shared by every member for keep-alive traffic
    #[serde(default = "default_backup_port")]
    pub port: u16,

    /// Arbitration weight of this node (higher wins)
    #[serde(default)]
    pub priority: i32,

    /// Silence after which a non-active node escalates
    #[serde(default = "default_keepalive_timeout_ms")]
    pub keepalive_timeout_ms: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_backup_port() -> u16 {
    10001
}

fn default_keepalive_timeout_ms() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            port: default_backup_port(),
            priority: 0,
            keepalive_timeout_ms: default_keepalive_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BackupConfig {
    /// Get keep-alive timeout as Duration
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }

    /// Validate the failover group settings
    pub fn validate(&self) -> crate::Result<()> {
        if self.port == 0 {
            return Err(crate::Error::Config("backup.port cannot be 0".into()));
        }

        if self.keepalive_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "backup.keepalive_timeout_ms must be greater than 0".into(),
            ));
        }

        for member in &self.members {
            // Inbound keep-alives are matched by source IP, so names would never match
            if member.parse::<IpAddr>().is_err() {
                return Err(crate::Error::Config(format!(
                    "backup.members entry '{}' must be an IP address without a port (use backup.port)",
                    member
                )));
            }
        }

        Ok(())
    }
}

impl WolfHaConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfHaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        self.backup.validate()
    }

    /// Address the keep-alive socket binds to
    pub fn socket_address(&self) -> String {
        if self.node.bind_address.contains(':') && !self.node.bind_address.starts_with('[') {
            format!("[{}]:{}", self.node.bind_address, self.backup.port)
        } else {
            format!("{}:{}", self.node.bind_address, self.backup.port)
        }
    }

    /// Get keep-alive timeout as Duration
    pub fn keepalive_timeout(&self) -> Duration {
        self.backup.keepalive_timeout()
    }
}
