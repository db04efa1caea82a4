// ABOUTME: Provider-agnostic description of where the primary and replicas live
// ABOUTME: Maps a cluster config onto connection targets and publisher conninfo

use crate::config::ClusterConfig;
use crate::error::ReplicationError;
use anyhow::Result;
use serde::Serialize;

/// How to reach one PostgreSQL instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTarget {
    /// Human label ("primary", "replica-1") for logs and reports
    pub label: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
}

impl ConnectionTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Enumerates the cluster and the data-plane route from replicas to the primary
pub trait Topology: Send + Sync {
    /// How the orchestrator reaches the primary
    fn primary(&self) -> ConnectionTarget;

    /// Replica targets in their fixed processing order
    fn replicas(&self) -> Vec<ConnectionTarget>;

    /// Conninfo a replica uses to reach the primary over the internal network
    fn publisher_conninfo(&self) -> String;
}

/// Topology of a locally provisioned cluster: the primary and replicas publish
/// their ports on the host, and replicas reach the primary by its internal name.
pub struct LocalTopology {
    config: ClusterConfig,
    password: String,
    replicas: Vec<ConnectionTarget>,
}

impl LocalTopology {
    /// Fails with `InvalidConfiguration` when a replica port falls outside 1..=65535
    pub fn new(config: ClusterConfig, password: impl Into<String>) -> Result<Self> {
        let primary = &config.postgres.primary;
        let replicas = &config.postgres.replicas;
        let targets = (0..replicas.count)
            .map(|i| {
                Ok(ConnectionTarget {
                    label: replica_label(&replicas.name_prefix, i),
                    host: replicas.host.clone(),
                    port: replica_port(replicas.base_port, i)?,
                    database: primary.database.clone(),
                    user: primary.user.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            replicas: targets,
            config,
            password: password.into(),
        })
    }
}

impl Topology for LocalTopology {
    fn primary(&self) -> ConnectionTarget {
        let primary = &self.config.postgres.primary;
        ConnectionTarget {
            label: "primary".to_string(),
            host: primary.host.clone(),
            port: primary.port,
            database: primary.database.clone(),
            user: primary.user.clone(),
        }
    }

    fn replicas(&self) -> Vec<ConnectionTarget> {
        self.replicas.clone()
    }

    fn publisher_conninfo(&self) -> String {
        let primary = &self.config.postgres.primary;
        let port = primary.internal_port.to_string();
        [
            ("host", primary.internal_host.as_str()),
            ("port", port.as_str()),
            ("dbname", primary.database.as_str()),
            ("user", primary.user.as_str()),
            ("password", self.password.as_str()),
        ]
        .iter()
        .map(|(key, value)| format!("{}={}", key, conninfo_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Port of replica `index` (0-based): `base_port + index`
fn replica_port(base_port: u16, index: usize) -> Result<u16> {
    u16::try_from(index)
        .ok()
        .and_then(|offset| base_port.checked_add(offset))
        .filter(|port| *port > 0)
        .ok_or_else(|| {
            ReplicationError::InvalidConfiguration(format!(
                "replica {} has no valid port (base_port {} + {})",
                index + 1,
                base_port,
                index
            ))
            .into()
        })
}

/// Replica label: the instance name when a prefix is configured, else "replica-N"
fn replica_label(name_prefix: &str, index: usize) -> String {
    if name_prefix.is_empty() {
        format!("replica-{}", index + 1)
    } else {
        format!("{}{}", name_prefix, index + 1)
    }
}

/// Render a libpq key/value conninfo value, quoting it when required
pub fn conninfo_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
