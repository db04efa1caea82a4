// ABOUTME: Cluster and replication configuration loaded from TOML
// ABOUTME: Applies verify defaults and validates settings before orchestration

use crate::error::ReplicationError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    /// disable | prefer | require
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default)]
    pub primary: PrimaryConfig,
    #[serde(default)]
    pub replicas: ReplicasConfig,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            ssl_mode: default_ssl_mode(),
            primary: PrimaryConfig::default(),
            replicas: ReplicasConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrimaryConfig {
    /// Host the orchestrator uses to reach the primary
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Host replicas use to reach the primary (container or service name)
    #[serde(default = "default_host")]
    pub internal_host: String,
    #[serde(default = "default_internal_port")]
    pub internal_port: u16,
    pub database: String,
    pub user: String,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 5432,
            internal_host: default_host(),
            internal_port: default_internal_port(),
            database: "postgres".to_string(),
            user: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicasConfig {
    #[serde(default)]
    pub count: usize,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_port: u16,
    #[serde(default)]
    pub name_prefix: String,
}

impl Default for ReplicasConfig {
    fn default() -> Self {
        Self {
            count: 0,
            host: default_host(),
            base_port: 0,
            name_prefix: String::new(),
        }
    }
}

/// The `[replication]` block
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub publication_name: String,
    #[serde(default)]
    pub subscription_prefix: String,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub copy_data: bool,
    #[serde(default)]
    pub create_slot: bool,
    #[serde(default)]
    pub verify: VerifyConfig,
}

/// Controls how "caught up" is verified. Zero values fall back to defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub strict_lsn_match: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 0,
            timeout_secs: 0,
            strict_lsn_match: true,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_internal_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_true() -> bool {
    true
}

impl VerifyConfig {
    pub fn poll_interval(&self) -> Duration {
        if self.poll_interval_ms == 0 {
            DEFAULT_POLL_INTERVAL
        } else {
            Duration::from_millis(self.poll_interval_ms)
        }
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            DEFAULT_VERIFY_TIMEOUT
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }
}

impl ReplicationConfig {
    /// Deterministic subscription name for replica `replica_index` (0-based).
    ///
    /// Prefix "pgbench_sub_" yields pgbench_sub_1, pgbench_sub_2, ...
    pub fn subscription_name(&self, replica_index: usize) -> String {
        format!("{}{}", self.subscription_prefix, replica_index + 1)
    }

    pub fn validate(&self, replica_count: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if replica_count == 0 {
            return Err(invalid(
                "replication.enabled is true but postgres.replicas.count is 0",
            ));
        }
        if self.publication_name.trim().is_empty() {
            return Err(invalid(
                "replication.publication_name must be set when replication.enabled is true",
            ));
        }
        if self.subscription_prefix.trim().is_empty() {
            return Err(invalid(
                "replication.subscription_prefix must be set when replication.enabled is true",
            ));
        }
        if self.tables.is_empty() {
            return Err(invalid(
                "replication.tables must contain at least one table when replication.enabled is true",
            ));
        }
        if let Some(idx) = self.tables.iter().position(|t| t.trim().is_empty()) {
            return Err(invalid(&format!("replication.tables[{}] is empty", idx)));
        }
        Ok(())
    }
}

impl ClusterConfig {
    /// Read, parse and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: ClusterConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.postgres.primary.port == 0 {
            return Err(invalid("postgres.primary.port must be > 0"));
        }
        if self.postgres.primary.database.trim().is_empty() {
            return Err(invalid("postgres.primary.database must be set"));
        }
        let replicas = &self.postgres.replicas;
        if replicas.count > 0 {
            if replicas.base_port == 0 {
                return Err(invalid(
                    "postgres.replicas.base_port must be > 0 when replicas.count > 0",
                ));
            }
            // Replica i listens on base_port + i.
            if replicas.count - 1 > usize::from(u16::MAX - replicas.base_port) {
                return Err(invalid(&format!(
                    "postgres.replicas.base_port {} leaves no room for {} replicas (last port would exceed {})",
                    replicas.base_port,
                    replicas.count,
                    u16::MAX
                )));
            }
        }
        match self.postgres.ssl_mode.as_str() {
            "disable" | "prefer" | "require" => {}
            other => {
                return Err(invalid(&format!(
                    "postgres.ssl_mode must be one of disable, prefer, require (got '{}')",
                    other
                )))
            }
        }
        self.replication.validate(self.postgres.replicas.count)
    }
}

fn invalid(msg: &str) -> anyhow::Error {
    ReplicationError::InvalidConfiguration(msg.to_string()).into()
}
