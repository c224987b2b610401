//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Health check definitions
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

impl Config {
    /// Find a check definition by name.
    pub fn check(&self, name: &str) -> Option<&CheckConfig> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Report server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            server: ServerConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// HTTP server exposing the health report and metrics.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Whether the server is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind
    #[serde(default = "default_server_address")]
    pub address: SocketAddr,

    /// Path serving the JSON health report
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Path serving Prometheus metrics
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_server_address(),
            health_path: default_health_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

/// A single registered health check.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckConfig {
    /// Unique check name
    pub name: String,

    /// Free-form tags used to filter reports
    #[serde(default)]
    pub tags: Vec<String>,

    /// What to probe
    pub probe: ProbeConfig,

    /// Backoff sequence in seconds, indexed by consecutive failures
    #[serde(default)]
    pub interval_array_seconds: Option<Vec<u64>>,

    /// Fixed delay in seconds, used when no sequence is configured
    #[serde(default)]
    pub interval_seconds: Option<u64>,

    /// Probe timeout in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Probe definition for a check.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeConfig {
    /// Connect to a TCP port.
    Tcp {
        address: SocketAddr,

        /// Report degraded when connecting takes longer than this
        #[serde(default, with = "option_humantime_serde")]
        degraded_after: Option<Duration>,
    },
    /// Issue an HTTP GET and compare the status code.
    Http {
        address: SocketAddr,

        #[serde(default)]
        path: Option<String>,

        #[serde(default = "default_expected_status")]
        expected_status: u16,

        /// Report degraded when the response takes longer than this
        #[serde(default, with = "option_humantime_serde")]
        degraded_after: Option<Duration>,
    },
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_server_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_expected_status() -> u16 {
    200
}

/// Custom serde module for optional humantime durations.
mod option_humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => {
                let s = humantime::format_duration(*d).to_string();
                serializer.serialize_some(&s)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let d = humantime::parse_duration(&s).map_err(serde::de::Error::custom)?;
                Ok(Some(d))
            }
            None => Ok(None),
        }
    }
}
