// ABOUTME: Integration tests for the full replication workflow
// ABOUTME: Runs ensure, status and the smoke scenario against a live primary and replicas

use pg_replica_orchestrator::commands::{self, smoke, Cluster};
use pg_replica_orchestrator::error::{find_kind, ReplicationError};
use pg_replica_orchestrator::postgres::ConnectionProvider;
use pg_replica_orchestrator::replication::{ensure_replication, CatchUpOptions, Subscriber};
use pg_replica_orchestrator::topology::Topology;
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Helper to load the live cluster described by TEST_CONFIG (password from PG_PASSWORD)
fn test_cluster() -> Cluster {
    let path = env::var("TEST_CONFIG").expect("TEST_CONFIG must point at a cluster config");
    Cluster::from_config_file(&path).expect("TEST_CONFIG must load and PG_PASSWORD must be set")
}

#[tokio::test]
#[ignore]
async fn test_example_scenario_end_to_end() {
    let cluster = test_cluster();

    println!("Running smoke scenario...");
    let result = smoke::run_smoke(
        &cluster.config.replication,
        &cluster.topology,
        &cluster.connector,
        &CancellationToken::new(),
    )
    .await;

    assert!(result.is_ok(), "Smoke scenario failed: {:?}", result);
    println!("✓ Every replica received the row written on the primary");
}

#[tokio::test]
#[ignore]
async fn test_ensure_replication_is_repeatable() {
    let cluster = test_cluster();
    let config = smoke::smoke_config(&cluster.config.replication);
    let cancel = CancellationToken::new();

    let first = ensure_replication(&config, &cluster.topology, &cluster.connector, &cancel)
        .await
        .expect("first ensure failed");
    let second = ensure_replication(&config, &cluster.topology, &cluster.connector, &cancel)
        .await
        .expect("repeated ensure failed");

    assert_eq!(first.replicas.len(), cluster.topology.replicas().len());
    assert_eq!(second.replicas.len(), first.replicas.len());
    for outcome in &second.replicas {
        assert_eq!(outcome.progress.received, outcome.progress.latest_end);
    }
    println!("✓ Repeated ensure converged without changes");
}

#[tokio::test]
#[ignore]
async fn test_status_reports_caught_up_replicas() {
    let cluster = test_cluster();
    let config = smoke::smoke_config(&cluster.config.replication);
    ensure_replication(
        &config,
        &cluster.topology,
        &cluster.connector,
        &CancellationToken::new(),
    )
    .await
    .expect("ensure failed");

    let report = commands::status::collect_status(&config, &cluster.topology, &cluster.connector)
        .await
        .expect("status failed");

    for replica in &report.replicas {
        assert!(
            replica.progress.is_some(),
            "{} has no progress: {:?}",
            replica.label,
            replica.error
        );
    }
}

#[tokio::test]
#[ignore]
async fn test_wait_on_unknown_subscription_fails_fast() {
    let cluster = test_cluster();
    let replica = cluster
        .topology
        .replicas()
        .into_iter()
        .next()
        .expect("TEST_CONFIG must describe at least one replica");
    let db = cluster.connector.connect(&replica).await.expect("connect failed");

    let options = CatchUpOptions {
        poll_interval: Duration::from_millis(100),
        timeout: Duration::from_secs(5),
        strict: true,
    };
    let err = Subscriber::new(&db)
        .wait_until_caught_up("no_such_subscription", &options, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        find_kind(&err),
        Some(ReplicationError::StatementFailed { .. })
    ));
}
