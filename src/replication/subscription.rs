// ABOUTME: Subscription management for logical replication on replica databases
// ABOUTME: Ensures subscriptions exist and reads live apply progress

use super::sql;
use crate::error::ReplicationError;
use crate::postgres::SqlExecutor;
use anyhow::Result;
use serde::Serialize;
use std::fmt;

/// Opaque log-sequence position as reported by the catalog.
///
/// Positions are only compared for equality; no numeric encoding is assumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LogPosition(String);

impl LogPosition {
    /// Sentinel the catalog reports before any change has flowed
    pub const ORIGIN: &'static str = "0/0";

    pub fn new(value: impl Into<String>) -> Self {
        LogPosition(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_origin(&self) -> bool {
        self.0 == Self::ORIGIN
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live snapshot of one subscription's apply progress. Never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionProgress {
    pub subscription_name: String,
    pub received: LogPosition,
    pub latest_end: LogPosition,
    /// Apply worker pid, 0 when no worker is running
    pub pid: i32,
}

impl SubscriptionProgress {
    pub fn is_worker_running(&self) -> bool {
        self.pid != 0
    }
}

/// Desired subscription on a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub name: String,
    /// Conninfo the replica uses to reach the publisher
    pub conn_string: String,
    pub publication: String,
    pub copy_data: bool,
    pub create_slot: bool,
    pub enabled: bool,
}

/// Replication operations executed on a replica (subscriber) database
pub struct Subscriber<'a> {
    db: &'a dyn SqlExecutor,
}

impl<'a> Subscriber<'a> {
    pub fn new(db: &'a dyn SqlExecutor) -> Self {
        Self { db }
    }

    /// Create the subscription unless one with the same name already exists.
    ///
    /// An existing subscription is left exactly as it is, even when its stored
    /// connection, publication or options differ from `spec`.
    pub async fn ensure_subscription(&self, spec: &SubscriptionSpec) -> Result<()> {
        let spec = SubscriptionSpec {
            name: spec.name.trim().to_string(),
            conn_string: spec.conn_string.trim().to_string(),
            publication: spec.publication.trim().to_string(),
            ..spec.clone()
        };

        if spec.name.is_empty() {
            return Err(ReplicationError::InvalidArgument(
                "subscription name must be set".to_string(),
            )
            .into());
        }
        if spec.publication.is_empty() {
            return Err(ReplicationError::InvalidArgument(
                "publication name must be set".to_string(),
            )
            .into());
        }
        if spec.conn_string.is_empty() {
            return Err(ReplicationError::InvalidArgument(
                "publisher connection string must be set".to_string(),
            )
            .into());
        }

        if self.subscription_exists(&spec.name).await? {
            tracing::info!("✓ Subscription '{}' already exists", spec.name);
            tracing::debug!(
                "Existing subscription '{}' is not compared against the requested settings",
                spec.name
            );
            return Ok(());
        }

        tracing::info!("Creating subscription '{}'...", spec.name);
        let stmt = sql::create_subscription(&spec);
        self.db.execute(&stmt, &[]).await.map_err(|e| {
            let hint = creation_hint(&e.to_string());
            ReplicationError::statement_failed(
                format!("create subscription '{}'{}", spec.name, hint),
                e,
            )
        })?;

        tracing::info!("✓ Subscription '{}' created successfully", spec.name);
        Ok(())
    }

    async fn subscription_exists(&self, name: &str) -> Result<bool> {
        let rows = self
            .db
            .query(
                "SELECT subname::text FROM pg_subscription WHERE subname = $1",
                &[name],
            )
            .await
            .map_err(|e| {
                ReplicationError::statement_failed(format!("check pg_subscription ('{}')", name), e)
            })?;
        Ok(!rows.is_empty())
    }

    /// Read the live apply progress of a subscription from `pg_stat_subscription`.
    ///
    /// NULL positions read as empty and a NULL pid reads as 0. A missing row
    /// is reported as a failed statement.
    pub async fn progress(&self, subscription_name: &str) -> Result<SubscriptionProgress> {
        let context = || format!("read pg_stat_subscription ('{}')", subscription_name);

        // Table-sync workers report their own rows; prefer the apply worker's.
        let row = self
            .db
            .query_opt(
                "SELECT subname::text,
                        COALESCE(received_lsn::text, ''),
                        COALESCE(latest_end_lsn::text, ''),
                        COALESCE(pid, 0)::text
                 FROM pg_stat_subscription
                 WHERE subname = $1
                 ORDER BY relid IS NOT NULL, received_lsn IS NULL
                 LIMIT 1",
                &[subscription_name],
            )
            .await
            .map_err(|e| ReplicationError::statement_failed(context(), e))?
            .ok_or_else(|| {
                ReplicationError::statement_failed(
                    context(),
                    anyhow::anyhow!("subscription not found"),
                )
            })?;

        let pid = match row.get(3) {
            None => 0,
            Some(raw) => raw.parse::<i32>().map_err(|e| {
                ReplicationError::statement_failed(format!("{}: pid '{}'", context(), raw), e)
            })?,
        };

        Ok(SubscriptionProgress {
            subscription_name: row.get(0).unwrap_or(subscription_name).to_string(),
            received: LogPosition::new(row.get(1).unwrap_or_default()),
            latest_end: LogPosition::new(row.get(2).unwrap_or_default()),
            pid,
        })
    }
}

/// Extra guidance for the common ways CREATE SUBSCRIPTION fails
fn creation_hint(err_str: &str) -> &'static str {
    if err_str.contains("permission denied") || err_str.contains("must be superuser") {
        " (creating subscriptions requires superuser or pg_create_subscription on the replica)"
    } else if err_str.contains("publication") && err_str.contains("does not exist") {
        " (the publication must exist on the primary before subscribing)"
    } else if err_str.contains("could not connect to the publisher") {
        " (the replica cannot reach the primary with the publisher conninfo)"
    } else if err_str.contains("replication slot") {
        " (check max_replication_slots on the primary)"
    } else {
        ""
    }
}
