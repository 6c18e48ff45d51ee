//! Schema-initialised throwaway databases.

use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection, PgPool, postgres::PgPoolOptions};

use crate::{TestNetwork, postgres::PostgresContainer};

/// A running Postgres container with a schema applied and a pool connected to it.
///
/// The container is removed when this value is dropped.
pub struct TestDatabase {
    _postgres: PostgresContainer,
    pool: PgPool,
}

impl TestDatabase {
    /// Start a container, apply `schema_sql`, and connect a small pool.
    ///
    /// # Errors
    /// Returns an error when no container runtime is available or the schema fails to apply.
    pub async fn start(prefix: &str, schema_sql: &str) -> Result<Self> {
        let network = TestNetwork::new(prefix);
        let postgres = PostgresContainer::start(network.name()).await?;
        postgres.wait_until_ready().await?;
        apply_schema(&postgres.admin_dsn(), schema_sql).await?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&postgres.admin_dsn())
            .await
            .context("failed to connect test pool")?;

        Ok(Self {
            _postgres: postgres,
            pool,
        })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Apply a schema file statement by statement over one connection.
///
/// # Errors
/// Returns the first statement that fails, with its position.
pub async fn apply_schema(dsn: &str, schema_sql: &str) -> Result<()> {
    let mut connection = PgConnection::connect(dsn)
        .await
        .context("failed to connect for schema setup")?;

    for (index, statement) in split_sql_statements(schema_sql).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut connection)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

/// Split a schema file into statements terminated by `;` at end of line.
///
/// Comment-only lines and `psql` meta commands are skipped. Statements must
/// not contain dollar-quoted bodies spanning a line ending in `;`.
#[must_use]
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('\\') || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_statements_and_skips_comments() {
        let sql = "-- users\nCREATE TABLE a (id int);\n\\ir other.sql\nINSERT INTO a\n  VALUES (1);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE a (id int);");
        assert!(statements[1].starts_with("INSERT INTO a"));
    }

    #[test]
    fn keeps_trailing_statement_without_semicolon() {
        let statements = split_sql_statements("SELECT 1;\nSELECT 2");
        assert_eq!(statements, vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]);
    }
}
