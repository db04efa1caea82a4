// ABOUTME: Publication management for logical replication on the primary database
// ABOUTME: Ensures a publication exists and covers the desired tables, additively

use super::sql;
use crate::error::ReplicationError;
use crate::postgres::SqlExecutor;
use anyhow::Result;
use std::collections::HashSet;

/// Replication operations executed on the primary (publisher) database
pub struct Publisher<'a> {
    db: &'a dyn SqlExecutor,
}

impl<'a> Publisher<'a> {
    pub fn new(db: &'a dyn SqlExecutor) -> Self {
        Self { db }
    }

    /// Make sure publication `name` exists and includes every table in `tables`.
    ///
    /// Tables are `schema.table` references. Tables already published but absent
    /// from `tables` are kept: the publication only ever grows. At most one DDL
    /// statement is executed per call, and none once the publication is complete.
    pub async fn ensure_publication(&self, name: &str, tables: &[String]) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(
                ReplicationError::InvalidArgument("publication name must be set".to_string())
                    .into(),
            );
        }
        if tables.is_empty() {
            return Err(ReplicationError::InvalidArgument(
                "publication tables must not be empty".to_string(),
            )
            .into());
        }

        if !self.publication_exists(name).await? {
            tracing::info!(
                "Creating publication '{}' for {} table(s)...",
                name,
                tables.len()
            );
            let stmt = sql::create_publication(name, tables);
            self.db.execute(&stmt, &[]).await.map_err(|e| {
                ReplicationError::statement_failed(format!("create publication '{}'", name), e)
            })?;
            tracing::info!("✓ Publication '{}' created successfully", name);
            return Ok(());
        }

        let missing = self.missing_tables(name, tables).await?;
        if missing.is_empty() {
            tracing::info!("✓ Publication '{}' already covers all tables", name);
            return Ok(());
        }

        tracing::info!(
            "Adding {} table(s) to publication '{}': {}",
            missing.len(),
            name,
            missing.join(", ")
        );
        let stmt = sql::alter_publication_add_tables(name, &missing);
        self.db.execute(&stmt, &[]).await.map_err(|e| {
            ReplicationError::statement_failed(
                format!("alter publication '{}' add {}", name, missing.join(", ")),
                e,
            )
        })?;
        tracing::info!("✓ Publication '{}' updated", name);
        Ok(())
    }

    async fn publication_exists(&self, name: &str) -> Result<bool> {
        let rows = self
            .db
            .query(
                "SELECT pubname::text FROM pg_publication WHERE pubname = $1",
                &[name],
            )
            .await
            .map_err(|e| {
                ReplicationError::statement_failed(format!("check pg_publication ('{}')", name), e)
            })?;
        Ok(!rows.is_empty())
    }

    /// Tables currently in the publication, as `schema.table`
    pub async fn published_tables(&self, name: &str) -> Result<Vec<String>> {
        let rows = self
            .db
            .query(
                "SELECT (schemaname || '.' || tablename)::text
                 FROM pg_publication_tables
                 WHERE pubname = $1",
                &[name],
            )
            .await
            .map_err(|e| {
                ReplicationError::statement_failed(
                    format!("query pg_publication_tables ('{}')", name),
                    e,
                )
            })?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(0).map(str::to_string))
            .collect())
    }

    /// Desired tables not yet published, in desired order (exact, case-sensitive match)
    async fn missing_tables(&self, name: &str, desired: &[String]) -> Result<Vec<String>> {
        let existing: HashSet<String> = self.published_tables(name).await?.into_iter().collect();
        let mut seen = HashSet::new();
        Ok(desired
            .iter()
            .filter(|t| !existing.contains(t.as_str()) && seen.insert(t.as_str()))
            .cloned()
            .collect())
    }
}
