//! Idempotent migration execution over a single dedicated connection.
//!
//! Structural changes are serialized through one non-pooled connection so
//! they never interleave with concurrent application traffic. Statements
//! whose target already exists are classified by SQLSTATE and treated as
//! skipped successes rather than failures.

use crate::error::{RegistryDbError, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgConnection};
use tracing::{error, info, warn};

/// One named migration: an ordered batch of statements recorded under a
/// single entry in `migration_history` once applied.
pub struct Migration {
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// Pending migration set, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "001_performance_alerts",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS performance_alerts (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(255) NOT NULL UNIQUE,
                metric VARCHAR(255) NOT NULL,
                threshold DOUBLE PRECISION NOT NULL,
                severity VARCHAR(20) NOT NULL DEFAULT 'WARNING',
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                last_value DOUBLE PRECISION,
                last_triggered_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        ],
    },
    Migration {
        name: "002_operational_indexes",
        statements: &[
            "CREATE INDEX IF NOT EXISTS request_logs_requested_at_idx ON request_logs (requested_at DESC)",
            "CREATE INDEX IF NOT EXISTS request_logs_server_id_idx ON request_logs (server_id)",
            "CREATE INDEX IF NOT EXISTS tool_calls_called_at_idx ON tool_calls (called_at DESC)",
            "CREATE INDEX IF NOT EXISTS tool_calls_tenant_id_idx ON tool_calls (tenant_id)",
            "CREATE INDEX IF NOT EXISTS servers_tenant_id_idx ON servers (tenant_id)",
        ],
    },
];

/// Outcome of a single idempotent statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotentOutcome {
    Applied,
    Skipped,
}

/// Result of a full migration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub already_applied: Vec<String>,
}

/// Classify a database error as "target already exists".
///
/// Matching is on stable PostgreSQL SQLSTATE codes, with a narrow
/// message fallback for drivers that surface no code. Free-text wording
/// of the server message is deliberately not treated as a contract.
pub fn is_duplicate_object_error(code: Option<&str>, message: &str) -> bool {
    match code {
        Some(
            "42P07" // duplicate_table
            | "42710" // duplicate_object
            | "42701" // duplicate_column
            | "42P06" // duplicate_schema
            | "42723" // duplicate_function
            | "23505", // unique_violation
        ) => true,
        Some(_) => false,
        None => {
            let message = message.to_lowercase();
            message.contains("already exists") || message.contains("already defined")
        }
    }
}

fn as_duplicate(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            is_duplicate_object_error(code.as_deref(), db.message())
        }
        _ => false,
    }
}

/// Execute one statement, treating "already exists" as a skipped success.
/// Any other failure is logged and propagated.
pub async fn execute_idempotent(
    conn: &mut PgConnection,
    statement: &str,
    description: &str,
) -> Result<IdempotentOutcome> {
    match sqlx::query(statement).execute(&mut *conn).await {
        Ok(_) => {
            info!("Applied: {}", description);
            Ok(IdempotentOutcome::Applied)
        }
        Err(e) if as_duplicate(&e) => {
            info!("Skipped (already exists): {}", description);
            Ok(IdempotentOutcome::Skipped)
        }
        Err(e) => {
            error!("Failed: {}: {}", description, e);
            Err(RegistryDbError::Schema {
                object: description.to_string(),
                message: e.to_string(),
            })
        }
    }
}

pub struct MigrationRunner {
    database_url: String,
}

impl MigrationRunner {
    pub fn new(database_url: String) -> Self {
        Self { database_url }
    }

    /// Apply the full pending migration set in order over a dedicated
    /// connection. The connection is closed on exit, success or failure.
    pub async fn run_migrations(&self) -> Result<MigrationReport> {
        let mut conn = PgConnection::connect(&self.database_url)
            .await
            .map_err(|e| RegistryDbError::Connection(e.to_string()))?;

        let result = self.apply_all(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!("Error closing migration connection: {}", e);
        }

        result
    }

    async fn apply_all(&self, conn: &mut PgConnection) -> Result<MigrationReport> {
        self.ensure_history_table(conn).await?;
        self.enable_optional_extensions(conn).await;

        let mut report = MigrationReport::default();

        for migration in MIGRATIONS {
            if self.is_applied(conn, migration.name).await? {
                // Already applied is a success terminal state
                info!("Migration {} already applied", migration.name);
                report.already_applied.push(migration.name.to_string());
                continue;
            }

            info!("Applying migration {}", migration.name);
            for statement in migration.statements.iter().copied() {
                execute_idempotent(conn, statement, migration.name).await?;
            }

            sqlx::query(
                "INSERT INTO migration_history (migration_name) VALUES ($1) \
                 ON CONFLICT (migration_name) DO NOTHING",
            )
            .bind(migration.name)
            .execute(&mut *conn)
            .await
            .map_err(|e| RegistryDbError::Migration {
                name: migration.name.to_string(),
                reason: format!("failed to record in migration_history: {e}"),
            })?;

            report.applied.push(migration.name.to_string());
        }

        info!(
            "Migrations complete: {} applied, {} already applied",
            report.applied.len(),
            report.already_applied.len()
        );
        Ok(report)
    }

    async fn ensure_history_table(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS migration_history (
                id SERIAL PRIMARY KEY,
                migration_name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// The query-statistics extension requires server-side preloading, so
    /// failure here is expected on unprepared hosts and never fatal.
    async fn enable_optional_extensions(&self, conn: &mut PgConnection) {
        match sqlx::query("CREATE EXTENSION IF NOT EXISTS pg_stat_statements")
            .execute(conn)
            .await
        {
            Ok(_) => info!("pg_stat_statements extension available"),
            Err(e) => warn!(
                "pg_stat_statements unavailable, slow-query diagnostics degraded: {}",
                e
            ),
        }
    }

    async fn is_applied(&self, conn: &mut PgConnection, name: &str) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM migration_history WHERE migration_name = $1",
        )
        .bind(name)
        .fetch_optional(conn)
        .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_sqlstate_codes_are_skipped() {
        assert!(is_duplicate_object_error(Some("42P07"), ""));
        assert!(is_duplicate_object_error(Some("42710"), ""));
        assert!(is_duplicate_object_error(Some("42701"), ""));
        assert!(is_duplicate_object_error(Some("42P06"), ""));
        assert!(is_duplicate_object_error(Some("42723"), ""));
        assert!(is_duplicate_object_error(Some("23505"), ""));
    }

    #[test]
    fn test_other_sqlstate_codes_are_failures() {
        assert!(!is_duplicate_object_error(Some("42601"), "syntax error"));
        assert!(!is_duplicate_object_error(Some("42P01"), "relation missing"));
        // A code takes precedence over message wording
        assert!(!is_duplicate_object_error(
            Some("42601"),
            "relation already exists"
        ));
    }

    #[test]
    fn test_message_fallback_without_code() {
        assert!(is_duplicate_object_error(
            None,
            "relation \"server_health_summary\" already exists"
        ));
        assert!(is_duplicate_object_error(None, "type ALREADY DEFINED"));
        assert!(!is_duplicate_object_error(None, "permission denied"));
    }

    #[test]
    fn test_migration_set_is_ordered_and_unique() {
        let mut names: Vec<_> = MIGRATIONS.iter().map(|m| m.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted, "migrations must be declared in order");
        names.dedup();
        assert_eq!(names.len(), MIGRATIONS.len());
        assert!(MIGRATIONS.iter().all(|m| !m.statements.is_empty()));
    }
}
