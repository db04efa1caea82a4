// ABOUTME: Sequences publication, subscriptions and catch-up across a cluster
// ABOUTME: Single entry point that provisions one primary and N replicas, fail-fast

use super::catchup::CatchUpOptions;
use super::publication::Publisher;
use super::subscription::{Subscriber, SubscriptionProgress, SubscriptionSpec};
use crate::config::ReplicationConfig;
use crate::error::ReplicationError;
use crate::postgres::ConnectionProvider;
use crate::topology::{ConnectionTarget, Topology};
use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Final state of one replica after a successful run
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaOutcome {
    pub label: String,
    pub subscription: String,
    pub progress: SubscriptionProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub publication: String,
    pub replicas: Vec<ReplicaOutcome>,
}

/// Ensure logical replication for `config` across the cluster described by `topology`.
///
/// Steps:
/// 1. Ensure the publication on the primary (complete before any replica is touched)
/// 2. For each replica, in order: ensure its subscription, then wait for catch-up
///
/// The first replica failure aborts the run; later replicas are not attempted.
/// Safe to repeat: a converged cluster only sees read queries.
pub async fn ensure_replication<T, P>(
    config: &ReplicationConfig,
    topology: &T,
    connector: &P,
    cancel: &CancellationToken,
) -> Result<ReplicationReport>
where
    T: Topology + ?Sized,
    P: ConnectionProvider + ?Sized,
{
    if !config.enabled {
        return Err(ReplicationError::InvalidConfiguration(
            "replication is not enabled (set replication.enabled = true)".to_string(),
        )
        .into());
    }
    let replicas = topology.replicas();
    config.validate(replicas.len())?;

    ensure_publication_on_primary(config, topology, connector, cancel).await?;

    // Built for use from inside the replicas' network, not the orchestrator's.
    let conninfo = topology.publisher_conninfo();
    let options = CatchUpOptions::from(&config.verify);

    let mut outcomes = Vec::with_capacity(replicas.len());
    for (index, target) in replicas.iter().enumerate() {
        let subscription = config.subscription_name(index);
        tracing::info!(
            "Replica {}/{} '{}' ({}): subscription '{}'",
            index + 1,
            replicas.len(),
            target.label,
            target.addr(),
            subscription
        );

        let progress = provision_replica(
            config,
            target,
            connector,
            &subscription,
            &conninfo,
            &options,
            cancel,
        )
        .await
        .context(ReplicationError::SequenceAborted {
            index,
            label: target.label.clone(),
            subscription: subscription.clone(),
        })?;

        tracing::info!("✓ {} caught up ({})", target.label, subscription);
        outcomes.push(ReplicaOutcome {
            label: target.label.clone(),
            subscription,
            progress,
        });
    }

    tracing::info!(
        "✓ Logical replication verified on {} replica(s)",
        outcomes.len()
    );
    Ok(ReplicationReport {
        publication: config.publication_name.trim().to_string(),
        replicas: outcomes,
    })
}

/// Run one step unless `cancel` fires first.
///
/// A token that is already cancelled never starts the step; one cancelled
/// mid-step drops the in-flight future (its connection goes with it).
pub(crate) async fn unless_cancelled<F, T>(
    cancel: &CancellationToken,
    step: impl Into<String>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let step = step.into();
            tracing::warn!("⚠ Cancelled during {}", step);
            Err(ReplicationError::Cancelled { step }.into())
        }
        result = fut => result,
    }
}

async fn ensure_publication_on_primary<T, P>(
    config: &ReplicationConfig,
    topology: &T,
    connector: &P,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Topology + ?Sized,
    P: ConnectionProvider + ?Sized,
{
    let target = topology.primary();
    tracing::info!("Connecting to {} ({})...", target.label, target.addr());
    let primary = unless_cancelled(cancel, format!("connect to {}", target.label), async {
        connector
            .connect(&target)
            .await
            .with_context(|| format!("Failed to connect to {} ({})", target.label, target.addr()))
    })
    .await?;

    unless_cancelled(cancel, "ensure publication", async {
        Publisher::new(&primary)
            .ensure_publication(&config.publication_name, &config.tables)
            .await
            .with_context(|| format!("Failed to ensure publication on {}", target.label))
    })
    .await
}

/// Subscribe one replica and wait for it; the handle is released on every path
async fn provision_replica<P>(
    config: &ReplicationConfig,
    target: &ConnectionTarget,
    connector: &P,
    subscription: &str,
    conninfo: &str,
    options: &CatchUpOptions,
    cancel: &CancellationToken,
) -> Result<SubscriptionProgress>
where
    P: ConnectionProvider + ?Sized,
{
    let replica = unless_cancelled(cancel, format!("connect to {}", target.label), async {
        connector
            .connect(target)
            .await
            .with_context(|| format!("Failed to connect to {} ({})", target.label, target.addr()))
    })
    .await?;
    let subscriber = Subscriber::new(&replica);

    let spec = SubscriptionSpec {
        name: subscription.to_string(),
        conn_string: conninfo.to_string(),
        publication: config.publication_name.clone(),
        copy_data: config.copy_data,
        create_slot: config.create_slot,
        enabled: true,
    };
    unless_cancelled(
        cancel,
        format!("ensure subscription '{}'", subscription),
        subscriber.ensure_subscription(&spec),
    )
    .await?;

    // Cancelling the run cancels this wait; finishing the wait leaves the run untouched.
    let replica_cancel = cancel.child_token();
    subscriber
        .wait_until_caught_up(subscription, options, &replica_cancel)
        .await
}
