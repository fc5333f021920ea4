//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Credentials are mandatory, so an unreadable or invalid file is fatal.

use crate::domain::types::Granularity;
use crate::io::store::DEFAULT_TABLE;
use crate::services::query_builder::DEFAULT_MAX_QUEUE_PREDICATES;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Longest supported poll period
pub const MAX_POLL_FREQUENCY_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct PureCloudConfig {
    /// Region domain, e.g. "mypurecloud.com" or "mypurecloud.ie"
    pub region: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// "PT30M", "PT60M" or "PT1H"
    pub granularity: String,
    pub frequency_secs: u64,
    /// Provider limit on predicates per filter clause
    #[serde(default = "default_max_queue_predicates")]
    pub max_queue_predicates: usize,
}

fn default_max_queue_predicates() -> usize {
    DEFAULT_MAX_QUEUE_PREDICATES
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueuesConfig {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: String,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Label attached to exported metrics
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "wallboard".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub purecloud: PureCloudConfig,
    pub polling: PollingConfig,
    pub queues: QueuesConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Clone)]
pub struct Config {
    site_id: String,
    region: String,
    client_id: String,
    client_secret: String,
    request_timeout_ms: u64,
    granularity: Granularity,
    poll_frequency_secs: u64,
    max_queue_predicates: usize,
    queue_ids: Vec<String>,
    database_path: String,
    table: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("site_id", &self.site_id)
            .field("region", &self.region)
            .field("client_id", &self.client_id)
            .field("granularity", &self.granularity)
            .field("poll_frequency_secs", &self.poll_frequency_secs)
            .field("queue_ids", &self.queue_ids)
            .field("database_path", &self.database_path)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "wallboard".to_string(),
            region: "mypurecloud.com".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_ms: 10_000,
            granularity: Granularity::ThirtyMinutes,
            poll_frequency_secs: 10,
            max_queue_predicates: DEFAULT_MAX_QUEUE_PREDICATES,
            queue_ids: Vec::new(),
            database_path: "wallboard.db".to_string(),
            table: DEFAULT_TABLE.to_string(),
            metrics_interval_secs: 60,
            prometheus_port: 0,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml_str(&content, &path.display().to_string())
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("Failed to parse TOML")?;

        let Some(granularity) = Granularity::parse(&toml_config.polling.granularity) else {
            bail!(
                "Invalid granularity '{}'. Use PT30M, PT60M or PT1H",
                toml_config.polling.granularity
            );
        };

        let config = Self {
            site_id: toml_config.site.id,
            region: toml_config.purecloud.region,
            client_id: toml_config.purecloud.client_id,
            client_secret: toml_config.purecloud.client_secret,
            request_timeout_ms: toml_config.purecloud.timeout_ms,
            granularity,
            poll_frequency_secs: toml_config.polling.frequency_secs,
            max_queue_predicates: toml_config.polling.max_queue_predicates,
            queue_ids: toml_config.queues.ids,
            database_path: toml_config.database.path,
            table: toml_config.database.table,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file: source.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the poller cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_frequency_secs == 0 || self.poll_frequency_secs > MAX_POLL_FREQUENCY_SECS {
            bail!(
                "Invalid frequency {}s. Keep it within 1..={} seconds",
                self.poll_frequency_secs,
                MAX_POLL_FREQUENCY_SECS
            );
        }
        if self.region.trim().is_empty() {
            bail!("purecloud.region must not be empty");
        }
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            bail!("purecloud.client_id and purecloud.client_secret are required");
        }
        if self.queue_ids.is_empty() {
            bail!("queues.ids must list at least one queue");
        }
        if self.queue_ids.len() > self.max_queue_predicates {
            bail!(
                "{} queues configured but the provider accepts at most {} per query",
                self.queue_ids.len(),
                self.max_queue_predicates
            );
        }
        let mut seen = HashSet::new();
        for id in &self.queue_ids {
            if id.trim().is_empty() {
                bail!("queues.ids contains an empty queue ID");
            }
            if !seen.insert(id.as_str()) {
                bail!("queue ID {} is listed more than once", id);
            }
        }
        if self.database_path.trim().is_empty() {
            bail!("database.path must not be empty");
        }
        if self.metrics_interval_secs == 0 {
            bail!("metrics.interval_secs must be positive");
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn poll_frequency_secs(&self) -> u64 {
        self.poll_frequency_secs
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_frequency_secs)
    }

    pub fn max_queue_predicates(&self) -> usize {
        self.max_queue_predicates
    }

    pub fn queue_ids(&self) -> &[String] {
        &self.queue_ids
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set tracked queues
    pub fn with_queue_ids(mut self, ids: &[&str]) -> Self {
        self.queue_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Builder method for tests to set the poll frequency
    pub fn with_poll_frequency_secs(mut self, secs: u64) -> Self {
        self.poll_frequency_secs = secs;
        self
    }

    /// Builder method for tests to set the predicate limit
    pub fn with_max_queue_predicates(mut self, limit: usize) -> Self {
        self.max_queue_predicates = limit;
        self
    }
}
