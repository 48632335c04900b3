//! Typed read-only wrappers over the monitoring views.
//!
//! Every function issues exactly one read and shapes the rows into a
//! summary type. An empty result set is a valid answer, never an error:
//! point-in-time reads return `Option`, list reads return an empty `Vec`.
//! Only genuine connectivity/query faults propagate.

use crate::analytics::models::*;
use crate::error::Result;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AnalyticsRepository {
    pool: PgPool,
}

impl AnalyticsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Most recent census of tracked endpoints.
    pub async fn server_health_summary(&self) -> Result<Option<ServerHealthSummary>> {
        let summary = sqlx::query_as::<_, ServerHealthSummary>(
            "SELECT total_servers, healthy_servers, unhealthy_servers, degraded_servers, \
             avg_response_time_ms FROM server_health_summary",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(summary)
    }

    /// Request counts and latency percentiles over the trailing window.
    pub async fn request_performance_summary(
        &self,
        window_hours: i32,
    ) -> Result<Option<RequestPerformanceSummary>> {
        debug!("Fetching request performance over last {}h", window_hours);
        let summary = sqlx::query_as::<_, RequestPerformanceSummary>(
            r#"
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
            WHERE requested_at > now() - make_interval(hours => $1)
            "#,
        )
        .bind(window_hours)
        .fetch_optional(&self.pool)
        .await?;
        Ok(summary)
    }

    pub async fn tenant_usage_summary(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantUsageSummary>> {
        let summary = sqlx::query_as::<_, TenantUsageSummary>(
            "SELECT tenant_id, tenant_name, server_count, tool_count, call_count \
             FROM tenant_usage_summary WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(summary)
    }

    pub async fn api_usage_statistics(&self, days: i32) -> Result<Vec<ApiUsageStatistics>> {
        let stats = sqlx::query_as::<_, ApiUsageStatistics>(
            "SELECT day, call_count, server_count, tool_count \
             FROM api_usage_statistics \
             WHERE day > (current_date - $1) \
             ORDER BY day DESC",
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await?;
        Ok(stats)
    }

    pub async fn server_performance_ranking(
        &self,
        limit: i64,
    ) -> Result<Vec<ServerPerformanceRanking>> {
        let ranking = sqlx::query_as::<_, ServerPerformanceRanking>(
            "SELECT server_id, server_name, request_count, error_count, \
             avg_duration_ms, p95_duration_ms \
             FROM server_performance_ranking \
             ORDER BY avg_duration_ms DESC NULLS LAST \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ranking)
    }

    pub async fn circuit_breaker_status(&self) -> Result<Vec<CircuitBreakerStatus>> {
        let breakers = sqlx::query_as::<_, CircuitBreakerStatus>(
            "SELECT service_name, state, failure_count, success_count, seconds_in_state \
             FROM circuit_breaker_status \
             ORDER BY service_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(breakers)
    }

    /// Connections per named pool as the server sees them.
    pub async fn connection_pool_stats(&self) -> Result<Vec<ConnectionPoolStats>> {
        let stats = sqlx::query_as::<_, ConnectionPoolStats>(
            r#"
            SELECT
                coalesce(nullif(application_name, ''), 'unnamed') AS pool_name,
                count(*) AS total_connections,
                count(*) FILTER (WHERE state = 'active') AS active_connections,
                count(*) FILTER (WHERE state = 'idle') AS idle_connections,
                (100.0 * count(*) FILTER (WHERE state = 'active')
                    / greatest(count(*), 1))::float8 AS utilization_pct
            FROM pg_stat_activity
            WHERE datname = current_database()
            GROUP BY coalesce(nullif(application_name, ''), 'unnamed')
            ORDER BY total_connections DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(stats)
    }

    pub async fn performance_alert_status(&self) -> Result<Vec<PerformanceAlertStatus>> {
        let alerts = sqlx::query_as::<_, PerformanceAlertStatus>(
            "SELECT id, name, metric, threshold, severity, enabled, last_value, \
             last_triggered_at, alert_status \
             FROM performance_alert_status \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(alerts)
    }
}
