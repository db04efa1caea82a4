// ABOUTME: In-memory stand-ins for PostgreSQL catalogs used by unit tests
// ABOUTME: Records DDL, answers catalog queries and serves scripted progress samples

use crate::postgres::{ConnectionProvider, SqlExecutor, TextRow};
use crate::topology::{ConnectionTarget, Topology};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Cross-instance log of "<label> <operation>" entries, in call order
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct FakeState {
    ddl: Vec<String>,
    publications: BTreeMap<String, Vec<String>>,
    subscriptions: BTreeSet<String>,
    progress: VecDeque<TextRow>,
    progress_reads: usize,
    hang_progress: bool,
    fail_matching: Option<String>,
    hang_matching: Option<String>,
    opened: usize,
    released: usize,
}

/// One fake database instance
pub(crate) struct FakeCatalog {
    label: String,
    journal: Journal,
    state: Mutex<FakeState>,
}

impl FakeCatalog {
    pub fn new(label: &str) -> Arc<Self> {
        Self::with_journal(label, Journal::default())
    }

    pub fn with_journal(label: &str, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            journal,
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn handle(self: &Arc<Self>) -> FakeDb {
        self.state.lock().unwrap().opened += 1;
        FakeDb {
            catalog: Arc::clone(self),
        }
    }

    pub fn add_publication(&self, name: &str, tables: &[&str]) {
        self.state.lock().unwrap().publications.insert(
            name.to_string(),
            tables.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn add_subscription(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(name.to_string());
    }

    /// Queue progress samples; the last one repeats forever
    pub fn push_progress(&self, received: Option<&str>, latest_end: Option<&str>, pid: Option<i32>) {
        let row = TextRow::new(vec![
            Some("sub".to_string()),
            received.map(str::to_string),
            latest_end.map(str::to_string),
            pid.map(|p| p.to_string()),
        ]);
        self.state.lock().unwrap().progress.push_back(row);
    }

    pub fn hang_progress_reads(&self) {
        self.state.lock().unwrap().hang_progress = true;
    }

    /// Never complete any statement whose SQL contains `needle`
    pub fn hang_on(&self, needle: &str) {
        self.state.lock().unwrap().hang_matching = Some(needle.to_string());
    }

    /// Fail any statement or query whose SQL contains `needle`
    pub fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_matching = Some(needle.to_string());
    }

    pub fn ddl(&self) -> Vec<String> {
        self.state.lock().unwrap().ddl.clone()
    }

    pub fn publication_tables(&self, name: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().publications.get(name).cloned()
    }

    pub fn has_subscription(&self, name: &str) -> bool {
        self.state.lock().unwrap().subscriptions.contains(name)
    }

    pub fn progress_reads(&self) -> usize {
        self.state.lock().unwrap().progress_reads
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn released(&self) -> usize {
        self.state.lock().unwrap().released
    }

    fn record(&self, op: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} {}", self.label, op));
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        if let Some(needle) = &state.fail_matching {
            if sql.contains(needle.as_str()) {
                bail!("injected failure on {}: {}", self.label, needle);
            }
        }
        Ok(())
    }

    fn apply_ddl(&self, sql: &str) {
        let mut state = self.state.lock().unwrap();
        state.ddl.push(sql.to_string());
        let name = first_quoted(sql);
        if sql.starts_with("CREATE PUBLICATION") {
            let tables = tables_after(sql, " FOR TABLE ");
            state.publications.insert(name, tables);
        } else if sql.starts_with("ALTER PUBLICATION") {
            let tables = tables_after(sql, " ADD TABLE ");
            state.publications.entry(name).or_default().extend(tables);
        } else if sql.starts_with("CREATE SUBSCRIPTION") {
            state.subscriptions.insert(name);
        }
    }
}

fn first_quoted(sql: &str) -> String {
    sql.split('"').nth(1).unwrap_or_default().to_string()
}

fn tables_after(sql: &str, marker: &str) -> Vec<String> {
    sql.split_once(marker)
        .map(|(_, list)| list.split(", ").map(|t| t.replace('"', "")).collect())
        .unwrap_or_default()
}

fn single(value: &str) -> TextRow {
    TextRow::new(vec![Some(value.to_string())])
}

/// Connection handle onto a `FakeCatalog`; dropping it counts as a release
pub(crate) struct FakeDb {
    catalog: Arc<FakeCatalog>,
}

impl Drop for FakeDb {
    fn drop(&mut self) {
        self.catalog.state.lock().unwrap().released += 1;
    }
}

#[async_trait]
impl SqlExecutor for FakeDb {
    async fn execute(&self, sql: &str, _params: &[&str]) -> Result<u64> {
        let verb: Vec<&str> = sql.split_whitespace().take(2).collect();
        self.catalog.record(&verb.join(" "));
        let hang = {
            let state = self.catalog.state.lock().unwrap();
            matches!(&state.hang_matching, Some(needle) if sql.contains(needle.as_str()))
        };
        if hang {
            std::future::pending::<()>().await;
        }
        self.catalog.check_failure(sql)?;
        self.catalog.apply_ddl(sql);
        Ok(0)
    }

    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<TextRow>> {
        self.catalog.check_failure(sql)?;
        let key = params.first().copied().unwrap_or_default();
        let state = self.catalog.state.lock().unwrap();
        let rows: Vec<TextRow> = if sql.contains("pg_publication_tables") {
            self.catalog.record("query pg_publication_tables");
            state
                .publications
                .get(key)
                .map(|tables| tables.iter().map(|t| single(t)).collect())
                .unwrap_or_default()
        } else if sql.contains("pg_publication") {
            self.catalog.record("query pg_publication");
            state
                .publications
                .get(key)
                .map(|_| vec![single(key)])
                .unwrap_or_default()
        } else if sql.contains("pg_stat_replication") {
            self.catalog.record("query pg_stat_replication");
            Vec::new()
        } else if sql.contains("pg_subscription") {
            self.catalog.record("query pg_subscription");
            if state.subscriptions.contains(key) {
                vec![single(key)]
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };
        Ok(rows)
    }

    async fn query_opt(&self, sql: &str, params: &[&str]) -> Result<Option<TextRow>> {
        if !sql.contains("pg_stat_subscription") {
            return Ok(self.query(sql, params).await?.into_iter().next());
        }
        self.catalog.check_failure(sql)?;
        self.catalog.record("query pg_stat_subscription");
        let hang = {
            let mut state = self.catalog.state.lock().unwrap();
            state.progress_reads += 1;
            state.hang_progress
        };
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.catalog.state.lock().unwrap();
        let row = if state.progress.len() > 1 {
            state.progress.pop_front()
        } else {
            state.progress.front().cloned()
        };
        Ok(row)
    }
}

/// Connection provider over a set of fake instances keyed by target label
pub(crate) struct FakeConnector {
    catalogs: BTreeMap<String, Arc<FakeCatalog>>,
    journal: Journal,
}

impl FakeConnector {
    pub fn new(journal: Journal, catalogs: &[&Arc<FakeCatalog>]) -> Self {
        Self {
            catalogs: catalogs
                .iter()
                .map(|c| (c.label.clone(), Arc::clone(c)))
                .collect(),
            journal,
        }
    }
}

#[async_trait]
impl ConnectionProvider for FakeConnector {
    type Handle = FakeDb;

    async fn connect(&self, target: &ConnectionTarget) -> Result<FakeDb> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} connect", target.label));
        let catalog = self
            .catalogs
            .get(&target.label)
            .ok_or_else(|| anyhow!("could not connect to {}", target.addr()))?;
        Ok(catalog.handle())
    }
}

/// Primary plus `replicas` replicas labelled "primary", "replica-1", ...
pub(crate) struct FakeTopology {
    pub replicas: usize,
}

fn target(label: String, port: u16) -> ConnectionTarget {
    ConnectionTarget {
        label,
        host: "localhost".to_string(),
        port,
        database: "pgbench".to_string(),
        user: "postgres".to_string(),
    }
}

impl Topology for FakeTopology {
    fn primary(&self) -> ConnectionTarget {
        target("primary".to_string(), 5432)
    }

    fn replicas(&self) -> Vec<ConnectionTarget> {
        (0..self.replicas)
            .map(|i| target(format!("replica-{}", i + 1), 5433 + i as u16))
            .collect()
    }

    fn publisher_conninfo(&self) -> String {
        "host=pg-primary port=5432 dbname=pgbench user=postgres password=secret".to_string()
    }
}
