// ABOUTME: Status command implementation - Check replication health
// ABOUTME: Displays publisher walsender stats and per-replica subscription progress

use super::Cluster;
use crate::config::ReplicationConfig;
use crate::error::ReplicationError;
use crate::postgres::ConnectionProvider;
use crate::replication::{
    format_lag, is_caught_up, publisher_stats, PublisherStats, Subscriber, SubscriptionProgress,
};
use crate::topology::Topology;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// What one replica reported
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaStatus {
    pub label: String,
    pub subscription: String,
    pub progress: Option<SubscriptionProgress>,
    pub caught_up: bool,
    /// Why progress could not be read (unreachable, subscription missing, ...)
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub publisher: Vec<PublisherStats>,
    pub replicas: Vec<ReplicaStatus>,
}

impl StatusReport {
    pub fn all_caught_up(&self) -> bool {
        !self.replicas.is_empty() && self.replicas.iter().all(|r| r.caught_up)
    }
}

/// Gather one status snapshot without changing anything.
///
/// The primary must be reachable. A replica that cannot be read is reported
/// with its error instead of failing the whole snapshot.
pub async fn collect_status<T, P>(
    config: &ReplicationConfig,
    topology: &T,
    connector: &P,
) -> Result<StatusReport>
where
    T: Topology + ?Sized,
    P: ConnectionProvider + ?Sized,
{
    let primary = topology.primary();
    let publisher = {
        let db = connector
            .connect(&primary)
            .await
            .with_context(|| format!("Failed to connect to {}", primary.label))?;
        publisher_stats(&db, None)
            .await
            .context("Failed to query replication statistics from the primary")?
    };

    let mut replicas = Vec::new();
    for (index, target) in topology.replicas().iter().enumerate() {
        let subscription = config.subscription_name(index);
        let read = async {
            let db = connector.connect(target).await?;
            Subscriber::new(&db).progress(&subscription).await
        };
        let status = match read.await {
            Ok(progress) => ReplicaStatus {
                label: target.label.clone(),
                caught_up: is_caught_up(&progress, config.verify.strict_lsn_match),
                subscription,
                progress: Some(progress),
                error: None,
            },
            Err(e) => ReplicaStatus {
                label: target.label.clone(),
                subscription,
                progress: None,
                caught_up: false,
                error: Some(describe(&e)),
            },
        };
        replicas.push(status);
    }

    Ok(StatusReport {
        publisher,
        replicas,
    })
}

/// One-line reason for a failed replica read
fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ReplicationError>() {
        // Already carries its cause.
        Some(kind) => kind.to_string(),
        None => format!("{:#}", err),
    }
}

/// Check replication status and display health information
///
/// This command:
/// 1. Queries pg_stat_replication on the primary for walsender lag
/// 2. Queries pg_stat_subscription on each replica for apply progress
/// 3. Displays health information in human-readable format (or JSON)
pub async fn status(config_path: &Path, json: bool) -> Result<()> {
    let cluster = Cluster::from_config_file(config_path)?;

    tracing::info!("Checking replication status...");
    let report = collect_status(
        &cluster.config.replication,
        &cluster.topology,
        &cluster.connector,
    )
    .await?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{}", rendered);
        return Ok(());
    }

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Replication Status Report");
    tracing::info!("========================================");
    tracing::info!("");

    if report.publisher.is_empty() {
        tracing::warn!("⚠ No active replication found on the primary");
        tracing::warn!("  Subscriptions may not exist yet or their workers are not connected");
        tracing::info!("");
    }
    for stat in &report.publisher {
        tracing::info!("Primary walsender:");
        tracing::info!("  Application: {}", stat.application_name);
        tracing::info!("  State: {}", stat.state);
        tracing::info!("  Sent LSN: {}", stat.sent_lsn);
        tracing::info!("  Replay LSN: {}", stat.replay_lsn);
        match stat.replay_lag_ms {
            Some(lag) => tracing::info!("  Replay Lag: {}", format_lag(lag)),
            None => tracing::info!("  Replay Lag: N/A"),
        }
        tracing::info!("");
    }

    for replica in &report.replicas {
        tracing::info!("Replica {} ({}):", replica.label, replica.subscription);
        match (&replica.progress, &replica.error) {
            (Some(progress), _) => {
                if progress.is_worker_running() {
                    tracing::info!("  Worker PID: {}", progress.pid);
                } else {
                    tracing::info!("  Worker PID: Not running");
                }
                tracing::info!("  Received LSN: {}", progress.received);
                tracing::info!("  Latest End LSN: {}", progress.latest_end);
                if replica.caught_up {
                    tracing::info!("  ✓ Caught up");
                } else {
                    tracing::warn!("  ⚠ Behind");
                }
            }
            (None, Some(error)) => tracing::warn!("  ✗ {}", error),
            (None, None) => tracing::warn!("  ✗ No progress reported"),
        }
        tracing::info!("");
    }

    tracing::info!("========================================");
    if report.all_caught_up() {
        tracing::info!("✓ All replicas are CAUGHT UP");
    } else {
        tracing::warn!("⚠ Replication is NOT fully caught up");
        tracing::warn!("  Run 'ensure' to provision missing subscriptions");
    }
    tracing::info!("========================================");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifyConfig;
    use crate::replication::testing::{FakeCatalog, FakeConnector, FakeTopology, Journal};

    fn config() -> ReplicationConfig {
        ReplicationConfig {
            enabled: true,
            publication_name: "repl_pub".to_string(),
            subscription_prefix: "repl_sub_".to_string(),
            tables: vec!["public.repl_test".to_string()],
            copy_data: true,
            create_slot: true,
            verify: VerifyConfig {
                poll_interval_ms: 500,
                timeout_secs: 10,
                strict_lsn_match: true,
            },
        }
    }

    #[tokio::test]
    async fn test_collect_status_reports_each_replica() {
        let journal = Journal::default();
        let primary = FakeCatalog::with_journal("primary", journal.clone());
        let replica1 = FakeCatalog::with_journal("replica-1", journal.clone());
        let replica2 = FakeCatalog::with_journal("replica-2", journal.clone());
        replica1.push_progress(Some("0/3000"), Some("0/3000"), Some(42));
        replica2.push_progress(Some("0/2000"), Some("0/3000"), Some(43));
        let connector = FakeConnector::new(journal.clone(), &[&primary, &replica1, &replica2]);

        let report = collect_status(&config(), &FakeTopology { replicas: 2 }, &connector)
            .await
            .unwrap();

        assert_eq!(report.replicas.len(), 2);
        assert_eq!(report.replicas[0].subscription, "repl_sub_1");
        assert!(report.replicas[0].caught_up);
        assert_eq!(report.replicas[1].subscription, "repl_sub_2");
        assert!(!report.replicas[1].caught_up);
        assert!(!report.all_caught_up());

        // Read-only: nothing was created anywhere.
        assert!(primary.ddl().is_empty());
        assert!(replica1.ddl().is_empty());
        assert!(replica2.ddl().is_empty());
    }

    #[tokio::test]
    async fn test_collect_status_keeps_going_past_missing_subscription() {
        let journal = Journal::default();
        let primary = FakeCatalog::with_journal("primary", journal.clone());
        let replica1 = FakeCatalog::with_journal("replica-1", journal.clone());
        let replica2 = FakeCatalog::with_journal("replica-2", journal.clone());
        replica2.push_progress(Some("0/0"), Some("0/0"), None);
        let connector = FakeConnector::new(journal.clone(), &[&primary, &replica1, &replica2]);

        let report = collect_status(&config(), &FakeTopology { replicas: 2 }, &connector)
            .await
            .unwrap();

        let first = &report.replicas[0];
        assert!(first.progress.is_none());
        assert!(first
            .error
            .as_deref()
            .unwrap()
            .contains("subscription not found"));

        // Strict mode never accepts the origin sentinel.
        let second = &report.replicas[1];
        assert!(second.progress.is_some());
        assert!(!second.caught_up);
    }

    #[tokio::test]
    async fn test_collect_status_requires_primary() {
        let journal = Journal::default();
        let replica1 = FakeCatalog::with_journal("replica-1", journal.clone());
        let connector = FakeConnector::new(journal.clone(), &[&replica1]);

        let err = collect_status(&config(), &FakeTopology { replicas: 1 }, &connector)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to connect to primary"));
    }
}
