//! Process configuration: loaded once at startup from a TOML file and
//! combined with CLI overrides. See [`crate::cli`] for the flags.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of States retained per device (§3: `stateBufferSize`).
pub const DEFAULT_STATE_BUFFER_SIZE: usize = 10;
/// Default number of wifi-scan batches retained per device.
pub const DEFAULT_WIFI_SCAN_BUFFER_SIZE: usize = 10;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RrmConfig {
    #[serde(default)]
    pub data_model: DataModelConfig,
    pub gateway: GatewayConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub zones: HashMap<String, ZoneConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataModelConfig {
    #[serde(default = "default_state_buffer_size")]
    pub state_buffer_size: usize,
    #[serde(default = "default_wifi_scan_buffer_size")]
    pub wifi_scan_buffer_size: usize,
}

fn default_state_buffer_size() -> usize {
    DEFAULT_STATE_BUFFER_SIZE
}
fn default_wifi_scan_buffer_size() -> usize {
    DEFAULT_WIFI_SCAN_BUFFER_SIZE
}

impl Default for DataModelConfig {
    fn default() -> Self {
        Self {
            state_buffer_size: DEFAULT_STATE_BUFFER_SIZE,
            wifi_scan_buffer_size: DEFAULT_WIFI_SCAN_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    #[serde(default = "default_wifi_scan_timeout_ms")]
    pub wifi_scan_timeout_ms: u64,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_socket_timeout_ms() -> u64 {
    10_000
}
fn default_wifi_scan_timeout_ms() -> u64 {
    30_000
}
fn default_verify_ssl() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_state_topic")]
    pub state_topic: String,
    #[serde(default = "default_wifiscan_topic")]
    pub wifiscan_topic: String,
    #[serde(default = "default_service_events_topic")]
    pub service_events_topic: String,
}

fn default_group_id() -> String {
    "openwifi-rrm".to_string()
}
fn default_state_topic() -> String {
    "state".to_string()
}
fn default_wifiscan_topic() -> String {
    "wifiscan".to_string()
}
fn default_service_events_topic() -> String {
    "service_events".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:16789".to_string()
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Per-zone schedule and algorithm bindings (§4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoneConfig {
    #[serde(default = "default_cron")]
    pub tpc_cron: String,
    #[serde(default = "default_cron")]
    pub channel_cron: String,
    #[serde(default = "default_cron")]
    pub steering_cron: String,
    pub tpc_algorithm: Option<String>,
    pub channel_algorithm: Option<String>,
    pub steering_algorithm: Option<String>,
    #[serde(default)]
    pub algorithm_args: HashMap<String, String>,
}

/// Fires on the hour; §10.6 supplement default for an unset zone schedule.
fn default_cron() -> String {
    "0 0 * * * *".to_string()
}

impl RrmConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
