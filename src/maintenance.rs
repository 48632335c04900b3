//! Operator-triggered maintenance: statistics refresh, unused-index and
//! slow-query detection, connection/transaction monitoring, and size
//! reporting. Everything here runs off the request path.

use crate::db::views::{ViewLifecycleReport, ViewRegistry, VIEW_CATALOG};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

/// Operationally critical tables whose planner statistics are refreshed
/// by `analyze_tables`.
pub const CRITICAL_TABLES: &[&str] = &[
    "servers",
    "request_logs",
    "tools",
    "tool_calls",
    "circuit_breakers",
    "performance_alerts",
];

/// Transactions running longer than this are flagged as long-running.
pub const LONG_TRANSACTION_THRESHOLD_SECS: f64 = 300.0;

/// Statement preview length in connection reports.
pub const STATEMENT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexUsage {
    Unused,
    RarelyUsed,
    OccasionallyUsed,
    FrequentlyUsed,
}

impl IndexUsage {
    /// Classify an index by its scan count.
    pub fn classify(scan_count: i64) -> Self {
        match scan_count {
            0 => IndexUsage::Unused,
            1..=9 => IndexUsage::RarelyUsed,
            10..=99 => IndexUsage::OccasionallyUsed,
            _ => IndexUsage::FrequentlyUsed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndexUsage::Unused => "Unused",
            IndexUsage::RarelyUsed => "Rarely Used",
            IndexUsage::OccasionallyUsed => "Occasionally Used",
            IndexUsage::FrequentlyUsed => "Frequently Used",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub schema: String,
    pub table: String,
    pub index: String,
    pub scan_count: i64,
    pub size_bytes: i64,
    pub usage: IndexUsage,
}

/// Full classification plus the Unused subset as the primary finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexUsageReport {
    pub unused: Vec<IndexInfo>,
    pub all: Vec<IndexInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQueryInfo {
    pub query: String,
    pub calls: i64,
    pub mean_exec_time_ms: f64,
    pub total_exec_time_ms: f64,
    pub cache_hit_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableStatisticsReport {
    pub analyzed: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub total: i64,
    pub active: i64,
    pub idle: i64,
    pub idle_in_transaction: i64,
    pub long_running: Vec<LongRunningTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongRunningTransaction {
    pub pid: i32,
    pub duration_seconds: f64,
    pub state: Option<String>,
    pub statement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSize {
    pub name: String,
    pub bytes: i64,
    pub pretty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSizeReport {
    pub database: String,
    pub total_bytes: i64,
    pub total_pretty: String,
    pub largest_relations: Vec<RelationSize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub statistics: TableStatisticsReport,
    pub views: ViewLifecycleReport,
}

/// Health-check outcome for operator tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryHealth {
    pub connectivity: bool,
    pub statements_extension: bool,
    pub views_ready: bool,
    pub missing_views: Vec<String>,
    pub issues: Vec<String>,
}

impl RegistryHealth {
    pub fn is_healthy(&self) -> bool {
        self.connectivity && self.views_ready && self.issues.is_empty()
    }

    pub fn status_summary(&self) -> String {
        if self.is_healthy() {
            "healthy".to_string()
        } else if self.issues.is_empty() {
            format!("degraded: {} views missing", self.missing_views.len())
        } else {
            format!("issues: {}", self.issues.join(", "))
        }
    }
}

/// Truncate a statement for display without splitting a UTF-8 boundary.
pub fn truncate_statement(statement: &str, max_chars: usize) -> String {
    let trimmed = statement.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut preview: String = trimmed.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}

pub struct MaintenanceRunner {
    pool: PgPool,
}

impl MaintenanceRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Re-run planner statistics collection over the critical tables.
    /// A table that fails (e.g. not yet created) is recorded and skipped.
    pub async fn analyze_tables(&self) -> TableStatisticsReport {
        let mut report = TableStatisticsReport::default();

        for table in CRITICAL_TABLES {
            match sqlx::query(&format!("ANALYZE {table}")).execute(&self.pool).await {
                Ok(_) => {
                    info!("Analyzed {}", table);
                    report.analyzed.push(table.to_string());
                }
                Err(e) => {
                    warn!("Failed to analyze {}: {}", table, e);
                    report.failed.push(table.to_string());
                }
            }
        }

        report
    }

    /// Classify every user index by scan count; the Unused subset is the
    /// primary finding.
    pub async fn find_unused_indexes(&self) -> Result<IndexUsageReport> {
        let rows = sqlx::query(
            r#"
            SELECT
                schemaname AS schema,
                relname AS table_name,
                indexrelname AS index_name,
                idx_scan AS scan_count,
                pg_relation_size(indexrelid) AS size_bytes
            FROM pg_stat_user_indexes
            ORDER BY idx_scan ASC, pg_relation_size(indexrelid) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let all: Vec<IndexInfo> = rows
            .into_iter()
            .map(|row| {
                let scan_count: i64 = row.get("scan_count");
                IndexInfo {
                    schema: row.get("schema"),
                    table: row.get("table_name"),
                    index: row.get("index_name"),
                    scan_count,
                    size_bytes: row.get("size_bytes"),
                    usage: IndexUsage::classify(scan_count),
                }
            })
            .collect();

        let unused = all
            .iter()
            .filter(|i| i.usage == IndexUsage::Unused)
            .cloned()
            .collect::<Vec<_>>();

        info!(
            "Index scan classification: {} total, {} unused",
            all.len(),
            unused.len()
        );

        Ok(IndexUsageReport { unused, all })
    }

    /// Top queries by mean execution time. Requires the query-statistics
    /// extension; when absent this degrades to an empty result with a
    /// warning rather than an error.
    pub async fn slow_queries(&self, limit: i64) -> Result<Vec<SlowQueryInfo>> {
        if !self.statements_extension_installed().await? {
            warn!("pg_stat_statements not installed, skipping slow-query analysis");
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT
                query,
                calls,
                mean_exec_time,
                total_exec_time,
                (100.0 * shared_blks_hit
                    / nullif(shared_blks_hit + shared_blks_read, 0))::float8 AS cache_hit_pct
            FROM pg_stat_statements
            ORDER BY mean_exec_time DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SlowQueryInfo {
                query: truncate_statement(row.get("query"), STATEMENT_PREVIEW_CHARS),
                calls: row.get("calls"),
                mean_exec_time_ms: row.get("mean_exec_time"),
                total_exec_time_ms: row.get("total_exec_time"),
                cache_hit_pct: row.get("cache_hit_pct"),
            })
            .collect())
    }

    /// Connection census plus any transaction running past the
    /// long-running threshold.
    pub async fn connection_report(&self) -> Result<ConnectionReport> {
        let totals = sqlx::query(
            r#"
            SELECT
                count(*) AS total,
                count(*) FILTER (WHERE state = 'active') AS active,
                count(*) FILTER (WHERE state = 'idle') AS idle,
                count(*) FILTER (WHERE state = 'idle in transaction') AS idle_in_transaction
            FROM pg_stat_activity
            WHERE datname = current_database()
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let long_rows = sqlx::query(
            r#"
            SELECT
                pid,
                EXTRACT(EPOCH FROM (now() - xact_start))::float8 AS duration_seconds,
                state,
                query
            FROM pg_stat_activity
            WHERE datname = current_database()
              AND xact_start IS NOT NULL
              AND now() - xact_start > make_interval(secs => $1)
            ORDER BY xact_start
            "#,
        )
        .bind(LONG_TRANSACTION_THRESHOLD_SECS)
        .fetch_all(&self.pool)
        .await?;

        let long_running: Vec<LongRunningTransaction> = long_rows
            .into_iter()
            .map(|row| LongRunningTransaction {
                pid: row.get("pid"),
                duration_seconds: row.get("duration_seconds"),
                state: row.get("state"),
                statement: truncate_statement(
                    row.get::<Option<String>, _>("query").unwrap_or_default().as_str(),
                    STATEMENT_PREVIEW_CHARS,
                ),
            })
            .collect();

        for txn in &long_running {
            warn!(
                "Long-running transaction: pid {} for {:.0}s: {}",
                txn.pid, txn.duration_seconds, txn.statement
            );
        }

        Ok(ConnectionReport {
            total: totals.get("total"),
            active: totals.get("active"),
            idle: totals.get("idle"),
            idle_in_transaction: totals.get("idle_in_transaction"),
            long_running,
        })
    }

    /// Total database size plus the largest relations.
    pub async fn database_size_report(&self) -> Result<DatabaseSizeReport> {
        let row = sqlx::query(
            "SELECT current_database() AS database, \
             pg_database_size(current_database()) AS total_bytes, \
             pg_size_pretty(pg_database_size(current_database())) AS total_pretty",
        )
        .fetch_one(&self.pool)
        .await?;

        let relations = sqlx::query(
            r#"
            SELECT
                c.relname AS name,
                pg_total_relation_size(c.oid) AS bytes,
                pg_size_pretty(pg_total_relation_size(c.oid)) AS pretty
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = 'public' AND c.relkind IN ('r', 'm')
            ORDER BY pg_total_relation_size(c.oid) DESC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(DatabaseSizeReport {
            database: row.get("database"),
            total_bytes: row.get("total_bytes"),
            total_pretty: row.get("total_pretty"),
            largest_relations: relations
                .into_iter()
                .map(|r| RelationSize {
                    name: r.get("name"),
                    bytes: r.get("bytes"),
                    pretty: r.get("pretty"),
                })
                .collect(),
        })
    }

    /// Statistics refresh followed by a materialized-view refresh.
    pub async fn optimize(&self) -> OptimizeReport {
        let statistics = self.analyze_tables().await;
        let views = ViewRegistry::new(&self.pool).refresh().await;
        OptimizeReport { statistics, views }
    }

    /// Connectivity, extension, and view-presence check.
    pub async fn health_check(&self) -> RegistryHealth {
        let mut health = RegistryHealth::default();

        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => health.connectivity = true,
            Err(e) => {
                health.issues.push(format!("connectivity failed: {e}"));
                return health;
            }
        }

        match self.statements_extension_installed().await {
            Ok(installed) => health.statements_extension = installed,
            Err(e) => health
                .issues
                .push(format!("failed to check pg_stat_statements: {e}")),
        }

        match self.existing_view_names().await {
            Ok(existing) => {
                for view in VIEW_CATALOG {
                    if !existing.contains(&view.name.to_string()) {
                        health.missing_views.push(view.name.to_string());
                    }
                }
                health.views_ready = health.missing_views.is_empty();
            }
            Err(e) => health.issues.push(format!("failed to check views: {e}")),
        }

        health
    }

    async fn statements_extension_installed(&self) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM pg_extension WHERE extname = 'pg_stat_statements'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn existing_view_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT viewname FROM pg_views WHERE schemaname = 'public' \
             UNION ALL \
             SELECT matviewname FROM pg_matviews WHERE schemaname = 'public'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_usage_classification_boundaries() {
        assert_eq!(IndexUsage::classify(0), IndexUsage::Unused);
        assert_eq!(IndexUsage::classify(1), IndexUsage::RarelyUsed);
        assert_eq!(IndexUsage::classify(9), IndexUsage::RarelyUsed);
        assert_eq!(IndexUsage::classify(10), IndexUsage::OccasionallyUsed);
        assert_eq!(IndexUsage::classify(99), IndexUsage::OccasionallyUsed);
        assert_eq!(IndexUsage::classify(100), IndexUsage::FrequentlyUsed);
        assert_eq!(IndexUsage::classify(5_000_000), IndexUsage::FrequentlyUsed);
    }

    #[test]
    fn test_index_usage_labels() {
        assert_eq!(IndexUsage::classify(0).label(), "Unused");
        assert_eq!(IndexUsage::classify(9).label(), "Rarely Used");
        assert_eq!(IndexUsage::classify(99).label(), "Occasionally Used");
        assert_eq!(IndexUsage::classify(100).label(), "Frequently Used");
    }

    #[test]
    fn test_truncate_statement() {
        assert_eq!(truncate_statement("SELECT 1", 120), "SELECT 1");
        assert_eq!(truncate_statement("  SELECT 1  ", 120), "SELECT 1");

        let long = "x".repeat(200);
        let preview = truncate_statement(&long, 120);
        assert_eq!(preview.chars().count(), 123);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_truncate_statement_multibyte_safe() {
        let statement = "é".repeat(200);
        let preview = truncate_statement(&statement, 120);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 123);
    }

    #[test]
    fn test_registry_health_summary() {
        let mut health = RegistryHealth {
            connectivity: true,
            statements_extension: true,
            views_ready: true,
            missing_views: vec![],
            issues: vec![],
        };
        assert!(health.is_healthy());
        assert_eq!(health.status_summary(), "healthy");

        health.views_ready = false;
        health.missing_views.push("tenant_usage_summary".to_string());
        assert!(!health.is_healthy());
        assert!(health.status_summary().contains("1 views missing"));
    }
}
