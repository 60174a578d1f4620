//! Cluster configuration loaded from YAML

use crate::error::Result;
use crate::fallback::FallbackKind;
use crate::node::NodeOptions;
use crate::region::RegionSet;
use crate::transport::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Online-set index used by dispatch when round-robin is off
    #[serde(default)]
    pub default_node: usize,
    #[serde(default)]
    pub round_robin: bool,
    #[serde(default)]
    pub fallback: FallbackKind,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            default_node: 0,
            round_robin: false,
            fallback: FallbackKind::FirstOnline,
            logging: LoggingConfig::default(),
            probe: ProbeSettings::default(),
            nodes: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Health probe timing, in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl From<ProbeSettings> for ProbeConfig {
    fn from(settings: ProbeSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
        }
    }
}

/// Regions of a node: a named group (`eu`, `half_one`, ...) or explicit identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionSpec {
    Named(String),
    List(Vec<String>),
}

impl Default for RegionSpec {
    fn default() -> Self {
        Self::Named("all".to_string())
    }
}

impl RegionSpec {
    pub fn to_region_set(&self) -> Result<RegionSet> {
        match self {
            Self::Named(name) => RegionSet::named(name),
            Self::List(ids) => RegionSet::new(ids),
        }
    }
}

/// One `nodes` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub regions: RegionSpec,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_rest_port")]
    pub rest_port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_ws_retry")]
    pub ws_retry: u32,
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
}

impl NodeConfig {
    pub fn options(&self) -> NodeOptions {
        NodeOptions {
            host: self.host.clone(),
            rest_port: self.rest_port,
            password: self.password.clone(),
            ws_port: self.ws_port,
            ws_retry: self.ws_retry,
            shard_count: self.shard_count,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_rest_port() -> u16 {
    2333
}

fn default_ws_port() -> u16 {
    80
}

fn default_ws_retry() -> u32 {
    10
}

fn default_shard_count() -> u32 {
    1
}
