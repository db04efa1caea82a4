// ABOUTME: Replication monitoring utilities
// ABOUTME: Queries publisher-side walsender statistics for status reporting

use crate::error::ReplicationError;
use crate::postgres::SqlExecutor;
use anyhow::Result;
use serde::Serialize;

/// Replication statistics from the primary (publisher), one per walsender
#[derive(Debug, Clone, Serialize)]
pub struct PublisherStats {
    pub application_name: String,
    pub state: String,
    pub sent_lsn: String,
    pub replay_lsn: String,
    pub replay_lag_ms: Option<i64>,
}

/// Read `pg_stat_replication` on the primary.
///
/// Logical subscriptions appear with their subscription name as
/// `application_name`; pass one to narrow the result.
pub async fn publisher_stats(
    db: &dyn SqlExecutor,
    subscription_name: Option<&str>,
) -> Result<Vec<PublisherStats>> {
    let base = "SELECT
            application_name::text,
            state::text,
            COALESCE(sent_lsn::text, ''),
            COALESCE(replay_lsn::text, ''),
            (EXTRACT(EPOCH FROM replay_lag) * 1000)::bigint::text
        FROM pg_stat_replication";

    let rows = match subscription_name {
        Some(name) => {
            let query = format!("{} WHERE application_name = $1", base);
            db.query(&query, &[name]).await
        }
        None => db.query(base, &[]).await,
    }
    .map_err(|e| ReplicationError::statement_failed("query pg_stat_replication", e))?;

    let mut stats = Vec::with_capacity(rows.len());
    for row in rows {
        stats.push(PublisherStats {
            application_name: row.get(0).unwrap_or_default().to_string(),
            state: row.get(1).unwrap_or_default().to_string(),
            sent_lsn: row.get(2).unwrap_or_default().to_string(),
            replay_lsn: row.get(3).unwrap_or_default().to_string(),
            replay_lag_ms: row.get(4).and_then(|v| v.parse().ok()),
        });
    }
    Ok(stats)
}

/// Format milliseconds into a human-readable duration string
pub fn format_lag(ms: i64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    } else {
        format!("{}h {}m", ms / 3_600_000, (ms % 3_600_000) / 60_000)
    }
}
