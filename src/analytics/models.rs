//! Read-model shapes for the monitoring views and catalog queries.
//!
//! These are derived continuously from the operational tables; nothing
//! here is written by this crate outside of setup/maintenance time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const CIRCUIT_STATE_OPEN: &str = "OPEN";
pub const CIRCUIT_STATE_CLOSED: &str = "CLOSED";
pub const CIRCUIT_STATE_HALF_OPEN: &str = "HALF_OPEN";

pub const SEVERITY_CRITICAL: &str = "CRITICAL";

/// Point-in-time census of tracked endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct ServerHealthSummary {
    pub total_servers: i64,
    pub healthy_servers: i64,
    pub unhealthy_servers: i64,
    pub degraded_servers: i64,
    pub avg_response_time_ms: Option<f64>,
}

/// Request counts and latency percentiles over a trailing window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct RequestPerformanceSummary {
    pub total_requests: i64,
    pub success_requests: i64,
    pub error_requests: i64,
    pub avg_duration_ms: Option<f64>,
    pub p95_duration_ms: Option<f64>,
    pub p99_duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantUsageSummary {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub server_count: i64,
    pub tool_count: i64,
    pub call_count: i64,
}

/// Per-day aggregate of call traffic.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiUsageStatistics {
    pub day: NaiveDate,
    pub call_count: i64,
    pub server_count: i64,
    pub tool_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServerPerformanceRanking {
    pub server_id: Uuid,
    pub server_name: String,
    pub request_count: i64,
    pub error_count: i64,
    pub avg_duration_ms: Option<f64>,
    pub p95_duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CircuitBreakerStatus {
    pub service_name: String,
    pub state: String,
    pub failure_count: i64,
    pub success_count: i64,
    pub seconds_in_state: Option<f64>,
}

impl CircuitBreakerStatus {
    pub fn is_open(&self) -> bool {
        self.state == CIRCUIT_STATE_OPEN
    }
}

/// Server-side view of connections grouped by application name, as
/// opposed to the process-local pool counters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectionPoolStats {
    pub pool_name: String,
    pub total_connections: i64,
    pub active_connections: i64,
    pub idle_connections: i64,
    pub utilization_pct: Option<f64>,
}

/// Alert definition plus the derived activity status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PerformanceAlertStatus {
    pub id: Uuid,
    pub name: String,
    pub metric: String,
    pub threshold: f64,
    pub severity: String,
    pub enabled: bool,
    pub last_value: Option<f64>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub alert_status: String,
}

impl PerformanceAlertStatus {
    /// Active critical alerts are the only ones that penalize the
    /// system health score.
    pub fn is_active_critical(&self) -> bool {
        self.severity == SEVERITY_CRITICAL && self.alert_status.starts_with("Active")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(severity: &str, status: &str) -> PerformanceAlertStatus {
        PerformanceAlertStatus {
            id: Uuid::nil(),
            name: "p95_latency".to_string(),
            metric: "p95_duration_ms".to_string(),
            threshold: 500.0,
            severity: severity.to_string(),
            enabled: true,
            last_value: None,
            last_triggered_at: None,
            alert_status: status.to_string(),
        }
    }

    #[test]
    fn test_active_critical_detection() {
        assert!(alert("CRITICAL", "Active-Critical").is_active_critical());
        assert!(!alert("CRITICAL", "Monitoring").is_active_critical());
        assert!(!alert("WARNING", "Active-Warning").is_active_critical());
        assert!(!alert("CRITICAL", "Inactive").is_active_critical());
    }

    #[test]
    fn test_breaker_open_detection() {
        let breaker = CircuitBreakerStatus {
            service_name: "upstream-a".to_string(),
            state: CIRCUIT_STATE_OPEN.to_string(),
            failure_count: 12,
            success_count: 0,
            seconds_in_state: Some(30.0),
        };
        assert!(breaker.is_open());

        let closed = CircuitBreakerStatus {
            state: CIRCUIT_STATE_CLOSED.to_string(),
            ..breaker.clone()
        };
        assert!(!closed.is_open());

        let half_open = CircuitBreakerStatus {
            state: CIRCUIT_STATE_HALF_OPEN.to_string(),
            ..breaker
        };
        assert!(!half_open.is_open());
    }
}
