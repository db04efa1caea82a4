// ABOUTME: Smoke command implementation - end-to-end replication check on a live cluster
// ABOUTME: Seeds a test table, ensures replication, writes a row and waits for every replica to see it

use super::{spawn_ctrl_c_watcher, Cluster};
use crate::config::ReplicationConfig;
use crate::postgres::{ConnectionProvider, SqlExecutor};
use crate::replication::ensure_replication;
use crate::replication::orchestrator::unless_cancelled;
use crate::topology::{ConnectionTarget, Topology};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const SMOKE_TABLE: &str = "public.repl_test";
pub const SMOKE_PUBLICATION: &str = "repl_pub";
pub const SMOKE_SUBSCRIPTION_PREFIX: &str = "repl_sub_";
pub const SMOKE_MESSAGE: &str = "hello from primary";

const ROW_WAIT: Duration = Duration::from_secs(10);
const ROW_POLL: Duration = Duration::from_millis(200);

/// Replication settings for the smoke run: the test table only, with an
/// initial copy and a fresh slot. Verification settings are kept.
pub fn smoke_config(base: &ReplicationConfig) -> ReplicationConfig {
    ReplicationConfig {
        enabled: true,
        publication_name: SMOKE_PUBLICATION.to_string(),
        subscription_prefix: SMOKE_SUBSCRIPTION_PREFIX.to_string(),
        tables: vec![SMOKE_TABLE.to_string()],
        copy_data: true,
        create_slot: true,
        verify: base.verify.clone(),
    }
}

/// Run the smoke scenario against an already connected cluster
pub async fn run_smoke<T, P>(
    base: &ReplicationConfig,
    topology: &T,
    connector: &P,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Topology + ?Sized,
    P: ConnectionProvider + ?Sized,
{
    let config = smoke_config(base);
    let primary = topology.primary();
    let replicas = topology.replicas();

    // Subscriptions need the table to exist on both ends before they start.
    unless_cancelled(
        cancel,
        format!("prepare {} on {}", SMOKE_TABLE, primary.label),
        prepare_table(connector, &primary, Some("seed")),
    )
    .await?;
    for target in &replicas {
        unless_cancelled(
            cancel,
            format!("prepare {} on {}", SMOKE_TABLE, target.label),
            prepare_table(connector, target, None),
        )
        .await?;
    }

    let report = ensure_replication(&config, topology, connector, cancel).await?;
    tracing::info!(
        "✓ Publication '{}' streaming to {} replica(s)",
        report.publication,
        report.replicas.len()
    );

    unless_cancelled(cancel, format!("insert row 2 on {}", primary.label), async {
        let db = connector.connect(&primary).await?;
        db.execute(
            &format!(
                "INSERT INTO {} (id, msg) VALUES (2, $1) \
                 ON CONFLICT (id) DO UPDATE SET msg = EXCLUDED.msg",
                SMOKE_TABLE
            ),
            &[SMOKE_MESSAGE],
        )
        .await
        .context("Failed to insert smoke row on the primary")?;
        tracing::info!("Inserted row 2 on {}", primary.label);
        Ok::<_, anyhow::Error>(())
    })
    .await?;

    for target in &replicas {
        let db = unless_cancelled(
            cancel,
            format!("connect to {}", target.label),
            connector.connect(target),
        )
        .await?;
        wait_for_row(&db, target, cancel).await?;
    }

    tracing::info!("✓ Smoke test passed: all replicas received the row");
    Ok(())
}

/// Create the smoke table if needed and empty it, optionally seeding row 1
async fn prepare_table<P>(connector: &P, target: &ConnectionTarget, seed: Option<&str>) -> Result<()>
where
    P: ConnectionProvider + ?Sized,
{
    let db = connector.connect(target).await?;
    db.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (id integer PRIMARY KEY, msg text)",
            SMOKE_TABLE
        ),
        &[],
    )
    .await
    .with_context(|| format!("Failed to create {} on {}", SMOKE_TABLE, target.label))?;
    db.execute(&format!("TRUNCATE {}", SMOKE_TABLE), &[])
        .await
        .with_context(|| format!("Failed to truncate {} on {}", SMOKE_TABLE, target.label))?;

    if let Some(msg) = seed {
        db.execute(
            &format!("INSERT INTO {} (id, msg) VALUES (1, $1)", SMOKE_TABLE),
            &[msg],
        )
        .await
        .with_context(|| format!("Failed to seed {} on {}", SMOKE_TABLE, target.label))?;
    }
    tracing::info!("✓ {} ready on {}", SMOKE_TABLE, target.label);
    Ok(())
}

async fn wait_for_row(
    db: &dyn SqlExecutor,
    target: &ConnectionTarget,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = Instant::now() + ROW_WAIT;
    let query = format!("SELECT msg FROM {} WHERE id = 2", SMOKE_TABLE);
    loop {
        let row = unless_cancelled(cancel, format!("read row 2 on {}", target.label), async {
            db.query_opt(&query, &[])
                .await
                .with_context(|| format!("Failed to read {} on {}", SMOKE_TABLE, target.label))
        })
        .await?;
        match row.as_ref().and_then(|r| r.get(0)) {
            Some(msg) if msg == SMOKE_MESSAGE => {
                tracing::info!("✓ {} sees row 2", target.label);
                return Ok(());
            }
            Some(other) => {
                tracing::debug!("{} has row 2 with unexpected msg '{}'", target.label, other)
            }
            None => tracing::debug!("{} does not have row 2 yet", target.label),
        }

        if Instant::now() >= deadline {
            bail!(
                "{} did not receive row 2 within {:?}",
                target.label,
                ROW_WAIT
            );
        }
        unless_cancelled(cancel, format!("wait for row 2 on {}", target.label), async {
            tokio::time::sleep(ROW_POLL).await;
            Ok::<_, anyhow::Error>(())
        })
        .await?;
    }
}

/// End-to-end replication check against the configured cluster
///
/// This command:
/// 1. Creates and empties `public.repl_test` on the primary and every replica
/// 2. Seeds row 1 on the primary
/// 3. Ensures `repl_pub` and `repl_sub_<n>` with an initial copy
/// 4. Inserts row 2 on the primary and waits for each replica to return it
pub async fn smoke(config_path: &Path) -> Result<()> {
    let cluster = Cluster::from_config_file(config_path)?;
    let cancel = CancellationToken::new();

    let watcher = spawn_ctrl_c_watcher(cancel.clone());

    let result = run_smoke(
        &cluster.config.replication,
        &cluster.topology,
        &cluster.connector,
        &cancel,
    )
    .await;
    watcher.abort();
    result.context("Smoke test failed")
}
