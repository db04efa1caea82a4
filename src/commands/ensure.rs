// ABOUTME: Ensure command implementation - converge the cluster onto the configured replication
// ABOUTME: Runs the orchestrator once with Ctrl-C wired to cancellation and reports the result

use super::{spawn_ctrl_c_watcher, Cluster};
use crate::replication::{ensure_replication, ReplicationReport};
use crate::topology::Topology;
use crate::utils::mask_conninfo;
use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Ensure the publication and every replica subscription, then wait for catch-up.
///
/// Safe to run repeatedly: a converged cluster is only read, never altered.
/// Pressing Ctrl-C cancels the wait in progress and fails the run.
///
/// # Errors
///
/// Returns an error if the config is invalid, `PG_PASSWORD` is unset, any
/// statement fails, or a replica does not catch up within the configured timeout.
pub async fn ensure(config_path: &Path, json: bool) -> Result<()> {
    let cluster = Cluster::from_config_file(config_path)?;

    tracing::info!("Ensuring logical replication...");
    tracing::info!("Publication: '{}'", cluster.config.replication.publication_name);
    tracing::info!(
        "Publisher conninfo (replica side): {}",
        mask_conninfo(&cluster.topology.publisher_conninfo())
    );

    let cancel = CancellationToken::new();
    let watcher = spawn_ctrl_c_watcher(cancel.clone());

    let result = ensure_replication(
        &cluster.config.replication,
        &cluster.topology,
        &cluster.connector,
        &cancel,
    )
    .await;
    watcher.abort();

    let report = result.context("Replication setup failed")?;
    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", rendered);
    } else {
        log_report(&report);
    }
    Ok(())
}

fn log_report(report: &ReplicationReport) {
    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Replication Ready");
    tracing::info!("========================================");
    tracing::info!("Publication: '{}'", report.publication);
    for outcome in &report.replicas {
        tracing::info!(
            "✓ {} ({}) caught up at {}",
            outcome.label,
            outcome.subscription,
            outcome.progress.latest_end
        );
    }
}
