// ABOUTME: Minimal database surface the replication code depends on
// ABOUTME: Implemented for tokio-postgres clients and for in-memory fakes in tests

use crate::topology::ConnectionTarget;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// One result row with every column read as nullable text.
///
/// Catalog queries cast their columns with `::text`, so a single representation
/// covers everything the replication code reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRow(pub Vec<Option<String>>);

impl TextRow {
    pub fn new(columns: Vec<Option<String>>) -> Self {
        TextRow(columns)
    }

    /// Column value, `None` when NULL or out of range
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|c| c.as_deref())
    }
}

/// Execute / query / query-at-most-one-row over a live connection.
///
/// Callers never learn how the connection was made or where the database runs.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a statement, returning the number of affected rows
    async fn execute(&self, sql: &str, params: &[&str]) -> Result<u64>;

    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<TextRow>>;

    /// Run a query expected to return zero or one row
    async fn query_opt(&self, sql: &str, params: &[&str]) -> Result<Option<TextRow>>;
}

/// Hands out ready, live connections for a target.
///
/// Readiness retries belong to the provider; handles returned are assumed live.
/// Dropping a handle releases it.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Handle: SqlExecutor;

    async fn connect(&self, target: &ConnectionTarget) -> Result<Self::Handle>;
}

fn bind<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn to_text_row(row: &tokio_postgres::Row) -> Result<TextRow> {
    let mut columns = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let value: Option<String> = row
            .try_get(idx)
            .with_context(|| format!("Column {} is not readable as text", idx))?;
        columns.push(value);
    }
    Ok(TextRow(columns))
}

#[async_trait]
impl SqlExecutor for Client {
    async fn execute(&self, sql: &str, params: &[&str]) -> Result<u64> {
        let bound = bind(params);
        let affected = Client::execute(self, sql, &bound).await?;
        Ok(affected)
    }

    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<TextRow>> {
        let bound = bind(params);
        let rows = Client::query(self, sql, &bound).await?;
        rows.iter().map(to_text_row).collect()
    }

    async fn query_opt(&self, sql: &str, params: &[&str]) -> Result<Option<TextRow>> {
        let bound = bind(params);
        let row = Client::query_opt(self, sql, &bound).await?;
        row.as_ref().map(to_text_row).transpose()
    }
}
