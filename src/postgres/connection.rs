// ABOUTME: PostgreSQL connection utilities for primary and replica targets
// ABOUTME: Handles TLS setup, readiness retries and connection lifecycle

use super::executor::ConnectionProvider;
use crate::topology::ConnectionTarget;
use crate::utils;
use anyhow::{Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::Client;

/// Readiness budget: a freshly started server may refuse connections for a while
const CONNECT_RETRIES: u32 = 6;
const CONNECT_INITIAL_DELAY: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a config `ssl_mode` string onto the driver's mode
pub fn parse_ssl_mode(mode: &str) -> Result<SslMode> {
    match mode {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => anyhow::bail!(
            "Unsupported ssl_mode '{}'. Expected one of: disable, prefer, require",
            other
        ),
    }
}

/// Connect to one target with TLS support
pub async fn connect(target: &ConnectionTarget, password: &str, ssl_mode: SslMode) -> Result<Client> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&target.host)
        .port(target.port)
        .dbname(&target.database)
        .user(&target.user)
        .password(password)
        .ssl_mode(ssl_mode)
        .connect_timeout(CONNECT_TIMEOUT)
        .application_name("pg-replica-orchestrator");

    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| describe_connect_error(target, &e.to_string()))?;

    let label = target.label.clone();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error ({}): {}", label, e);
        }
    });

    Ok(client)
}

/// Turn a driver error into an actionable message
fn describe_connect_error(target: &ConnectionTarget, error_msg: &str) -> anyhow::Error {
    let where_ = format!("{} ({})", target.label, target.addr());
    if error_msg.contains("password authentication failed") {
        anyhow::anyhow!(
            "Authentication failed for {}: invalid username or password.\n\
             Please verify PG_PASSWORD and the configured user.",
            where_
        )
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        anyhow::anyhow!(
            "Database does not exist on {}: {}\n\
             Please create the database first or check postgres.primary.database.",
            where_,
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect") {
        anyhow::anyhow!(
            "Connection refused by {}.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             Error: {}",
            where_,
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        anyhow::anyhow!(
            "Connection timeout: {} did not respond in time.\n\
             Error: {}",
            where_,
            error_msg
        )
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        anyhow::anyhow!(
            "TLS/SSL error connecting to {}.\n\
             Please verify postgres.ssl_mode.\n\
             Error: {}",
            where_,
            error_msg
        )
    } else {
        anyhow::anyhow!("Failed to connect to {}: {}", where_, error_msg)
    }
}

/// Connection provider backed by tokio-postgres, retrying until the server is ready
pub struct PgConnector {
    password: String,
    ssl_mode: SslMode,
}

impl PgConnector {
    pub fn new(password: impl Into<String>, ssl_mode: SslMode) -> Self {
        Self {
            password: password.into(),
            ssl_mode,
        }
    }
}

#[async_trait]
impl ConnectionProvider for PgConnector {
    type Handle = Client;

    async fn connect(&self, target: &ConnectionTarget) -> Result<Client> {
        utils::retry_with_backoff(
            || connect(target, &self.password, self.ssl_mode),
            CONNECT_RETRIES,
            CONNECT_INITIAL_DELAY,
        )
        .await
        .with_context(|| format!("Failed to connect to {} after retries", target.label))
    }
}
