//! Declarative catalog of derived views and materialized views, with
//! partial-failure-tolerant lifecycle management.
//!
//! The catalog is an ordered, immutable sequence: creation walks it
//! forward, drop walks it in exact reverse so cascade dependencies
//! resolve cleanly. A single bad definition never blocks its siblings;
//! every bulk operation returns an explicit accumulator report instead
//! of using errors for control flow.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewKind {
    View,
    MaterializedView,
}

/// A static catalog entry. `body` is the SELECT; the DDL wrapper is
/// composed per kind at execution time.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub name: &'static str,
    pub kind: ViewKind,
    pub body: &'static str,
    /// Post-creation index statements. Materialized views that want a
    /// concurrent refresh must carry a unique index here.
    pub indexes: &'static [&'static str],
}

/// Monitoring views in dependency order. Plain views read the
/// operational tables owned by the registry write path; materialized
/// views aggregate over trailing windows and are refreshed periodically.
pub const VIEW_CATALOG: &[ViewDefinition] = &[
    ViewDefinition {
        name: "server_health_summary",
        kind: ViewKind::View,
        body: r#"
            SELECT
                count(*) AS total_servers,
                count(*) FILTER (WHERE status = 'healthy') AS healthy_servers,
                count(*) FILTER (WHERE status = 'unhealthy') AS unhealthy_servers,
                count(*) FILTER (WHERE status = 'degraded') AS degraded_servers,
                avg(avg_response_time_ms)::float8 AS avg_response_time_ms
            FROM servers
        "#,
        indexes: &[],
    },
    ViewDefinition {
        name: "request_performance_summary",
        kind: ViewKind::View,
        body: r#"
            SELECT
                count(*) AS total_requests,
                count(*) FILTER (WHERE status_code < 400) AS success_requests,
                count(*) FILTER (WHERE status_code >= 400) AS error_requests,
                avg(duration_ms)::float8 AS avg_duration_ms,
                (percentile_cont(0.95) WITHIN GROUP (ORDER BY duration_ms))::float8
                    AS p95_duration_ms,
                (percentile_cont(0.99) WITHIN GROUP (ORDER BY duration_ms))::float8
                    AS p99_duration_ms
            FROM request_logs
            WHERE requested_at > now() - interval '1 hour'
        "#,
        indexes: &[],
    },
    ViewDefinition {
        name: "circuit_breaker_status",
        kind: ViewKind::View,
        body: r#"
            SELECT
                service_name,
                state,
                failure_count,
                success_count,
                EXTRACT(EPOCH FROM (now() - state_changed_at))::float8 AS seconds_in_state
            FROM circuit_breakers
        "#,
        indexes: &[],
    },
    ViewDefinition {
        name: "performance_alert_status",
        kind: ViewKind::View,
        body: r#"
            SELECT
                a.id,
                a.name,
                a.metric,
                a.threshold,
                a.severity,
                a.enabled,
                a.last_value,
                a.last_triggered_at,
                CASE
                    WHEN NOT a.enabled THEN 'Inactive'
                    WHEN a.last_triggered_at IS NULL THEN 'Monitoring'
                    WHEN a.last_triggered_at > now() - interval '15 minutes'
                         AND a.severity = 'CRITICAL' THEN 'Active-Critical'
                    WHEN a.last_triggered_at > now() - interval '15 minutes'
                         AND a.severity = 'WARNING' THEN 'Active-Warning'
                    WHEN a.last_triggered_at > now() - interval '15 minutes'
                         THEN 'Active-Info'
                    ELSE 'Monitoring'
                END AS alert_status
            FROM performance_alerts a
        "#,
        indexes: &[],
    },
    ViewDefinition {
        name: "tenant_usage_summary",
        kind: ViewKind::MaterializedView,
        body: r#"
            SELECT
                t.id AS tenant_id,
                t.name AS tenant_name,
                count(DISTINCT s.id) AS server_count,
                count(DISTINCT tl.id) AS tool_count,
                count(c.id) AS call_count
            FROM tenants t
            LEFT JOIN servers s ON s.tenant_id = t.id
            LEFT JOIN tools tl ON tl.tenant_id = t.id
            LEFT JOIN tool_calls c ON c.tenant_id = t.id
            GROUP BY t.id, t.name
        "#,
        indexes: &[
            "CREATE UNIQUE INDEX IF NOT EXISTS tenant_usage_summary_tenant_idx \
             ON tenant_usage_summary (tenant_id)",
        ],
    },
    ViewDefinition {
        name: "api_usage_statistics",
        kind: ViewKind::MaterializedView,
        body: r#"
            SELECT
                date_trunc('day', c.called_at)::date AS day,
                count(*) AS call_count,
                count(DISTINCT c.server_id) AS server_count,
                count(DISTINCT c.tool_id) AS tool_count
            FROM tool_calls c
            GROUP BY date_trunc('day', c.called_at)::date
        "#,
        indexes: &[
            "CREATE UNIQUE INDEX IF NOT EXISTS api_usage_statistics_day_idx \
             ON api_usage_statistics (day)",
        ],
    },
    ViewDefinition {
        name: "server_performance_ranking",
        kind: ViewKind::MaterializedView,
        body: r#"
            SELECT
                r.server_id,
                s.name AS server_name,
                count(*) AS request_count,
                count(*) FILTER (WHERE r.status_code >= 400) AS error_count,
                avg(r.duration_ms)::float8 AS avg_duration_ms,
                (percentile_cont(0.95) WITHIN GROUP (ORDER BY r.duration_ms))::float8
                    AS p95_duration_ms
            FROM request_logs r
            JOIN servers s ON s.id = r.server_id
            WHERE r.requested_at > now() - interval '7 days'
            GROUP BY r.server_id, s.name
        "#,
        indexes: &[
            "CREATE UNIQUE INDEX IF NOT EXISTS server_performance_ranking_server_idx \
             ON server_performance_ranking (server_id)",
        ],
    },
];

/// Explicit accumulator for bulk lifecycle operations. `success` is true
/// iff nothing failed; partial success stays observable instead of being
/// collapsed into a single error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewLifecycleReport {
    pub success: bool,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

impl ViewLifecycleReport {
    fn record_ok(&mut self, name: &str) {
        self.succeeded.push(name.to_string());
    }

    fn record_err(&mut self, name: &str, error: String) {
        self.failed.push(name.to_string());
        self.errors.insert(name.to_string(), error);
    }

    fn finish(mut self) -> Self {
        self.success = self.errors.is_empty();
        self
    }
}

/// Stateless executor over the static catalog.
pub struct ViewRegistry<'a> {
    pool: &'a PgPool,
    catalog: &'static [ViewDefinition],
}

impl<'a> ViewRegistry<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            catalog: VIEW_CATALOG,
        }
    }

    /// Create every view in declaration order. Index failures are logged
    /// but do not fail the view; a failing definition is recorded and
    /// processing continues with the next entry.
    pub async fn create(&self) -> ViewLifecycleReport {
        let mut report = ViewLifecycleReport::default();

        for view in self.catalog {
            let ddl = match view.kind {
                ViewKind::View => {
                    format!("CREATE OR REPLACE VIEW {} AS {}", view.name, view.body)
                }
                ViewKind::MaterializedView => format!(
                    "CREATE MATERIALIZED VIEW IF NOT EXISTS {} AS {}",
                    view.name, view.body
                ),
            };

            match sqlx::query(&ddl).execute(self.pool).await {
                Ok(_) => {
                    info!("Created view {}", view.name);
                    self.create_indexes(view).await;
                    report.record_ok(view.name);
                }
                Err(e) => {
                    error!("Failed to create view {}: {}", view.name, e);
                    report.record_err(view.name, e.to_string());
                }
            }
        }

        report.finish()
    }

    async fn create_indexes(&self, view: &ViewDefinition) {
        for index in view.indexes.iter().copied() {
            if let Err(e) = sqlx::query(index).execute(self.pool).await {
                // The view itself is usable; only concurrent refresh degrades
                warn!("Failed to create index for {}: {}", view.name, e);
            }
        }
    }

    /// Drop every view in reverse declaration order with cascade
    /// semantics, tolerating "does not exist".
    pub async fn drop(&self) -> ViewLifecycleReport {
        let mut report = ViewLifecycleReport::default();

        for view in self.catalog.iter().rev() {
            let ddl = match view.kind {
                ViewKind::View => format!("DROP VIEW IF EXISTS {} CASCADE", view.name),
                ViewKind::MaterializedView => {
                    format!("DROP MATERIALIZED VIEW IF EXISTS {} CASCADE", view.name)
                }
            };

            match sqlx::query(&ddl).execute(self.pool).await {
                Ok(_) => {
                    info!("Dropped view {}", view.name);
                    report.record_ok(view.name);
                }
                Err(e) => {
                    error!("Failed to drop view {}: {}", view.name, e);
                    report.record_err(view.name, e.to_string());
                }
            }
        }

        report.finish()
    }

    /// Refresh the materialized entries. The concurrent strategy keeps
    /// readers unblocked but requires the unique index and a populated
    /// view; when it fails the registry falls back to a blocking refresh
    /// with an explicit warning. Per-view failures never abort the batch.
    pub async fn refresh(&self) -> ViewLifecycleReport {
        let mut report = ViewLifecycleReport::default();

        for view in self
            .catalog
            .iter()
            .filter(|v| v.kind == ViewKind::MaterializedView)
        {
            let concurrent = format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {}", view.name);
            match sqlx::query(&concurrent).execute(self.pool).await {
                Ok(_) => {
                    info!("Refreshed materialized view {} (concurrent)", view.name);
                    report.record_ok(view.name);
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Concurrent refresh of {} failed ({}), falling back to blocking refresh",
                        view.name, e
                    );
                }
            }

            let blocking = format!("REFRESH MATERIALIZED VIEW {}", view.name);
            match sqlx::query(&blocking).execute(self.pool).await {
                Ok(_) => {
                    info!("Refreshed materialized view {} (blocking)", view.name);
                    report.record_ok(view.name);
                }
                Err(e) => {
                    error!("Failed to refresh materialized view {}: {}", view.name, e);
                    report.record_err(view.name, e.to_string());
                }
            }
        }

        report.finish()
    }

    /// Names of the materialized entries, in declaration order.
    pub fn materialized_names(&self) -> Vec<&'static str> {
        self.catalog
            .iter()
            .filter(|v| v.kind == ViewKind::MaterializedView)
            .map(|v| v.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        let mut names: Vec<_> = VIEW_CATALOG.iter().map(|v| v.name).collect();
        names.sort();
        let len = names.len();
        names.dedup();
        assert_eq!(names.len(), len);
    }

    #[test]
    fn test_materialized_views_carry_unique_index() {
        for view in VIEW_CATALOG
            .iter()
            .filter(|v| v.kind == ViewKind::MaterializedView)
        {
            assert!(
                view.indexes
                    .iter()
                    .any(|i| i.contains("UNIQUE INDEX")),
                "{} needs a unique index for concurrent refresh",
                view.name
            );
        }
    }

    #[test]
    fn test_drop_order_is_reverse_of_create_order() {
        let created: Vec<_> = VIEW_CATALOG.iter().map(|v| v.name).collect();
        let dropped: Vec<_> = VIEW_CATALOG.iter().rev().map(|v| v.name).collect();
        let mut reversed = created.clone();
        reversed.reverse();
        assert_eq!(dropped, reversed);
    }

    #[test]
    fn test_report_accumulation() {
        let mut report = ViewLifecycleReport::default();
        report.record_ok("a");
        report.record_ok("b");
        report.record_err("c", "boom".to_string());
        let report = report.finish();

        assert!(!report.success);
        assert_eq!(report.succeeded, vec!["a", "b"]);
        assert_eq!(report.failed, vec!["c"]);
        assert_eq!(report.errors.get("c").map(String::as_str), Some("boom"));
    }

    #[test]
    fn test_clean_report_is_success() {
        let mut report = ViewLifecycleReport::default();
        report.record_ok("a");
        assert!(report.finish().success);
    }
}
