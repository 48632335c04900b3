//! Single normalized health score synthesized from four independent
//! operational signals.
//!
//! The scoring function is pure and database-free; the aggregator
//! fetches its inputs concurrently and substitutes the zero-penalty
//! default for any signal that is unavailable, so it never fails the
//! whole score for one degraded upstream.

use crate::analytics::models::{RequestPerformanceSummary, ServerHealthSummary};
use crate::analytics::queries::AnalyticsRepository;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Penalty weights per signal.
pub const SERVER_HEALTH_WEIGHT: f64 = 30.0;
pub const ERROR_RATE_WEIGHT: f64 = 25.0;
pub const OPEN_BREAKER_WEIGHT: f64 = 10.0;
pub const CRITICAL_ALERT_WEIGHT: f64 = 15.0;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

pub const HEALTHY_THRESHOLD: u8 = 80;
pub const DEGRADED_THRESHOLD: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// The four raw inputs to the score. Counts default to the zero-penalty
/// value when an upstream signal is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSignals {
    pub total_servers: i64,
    pub healthy_servers: i64,
    pub total_requests: i64,
    pub error_requests: i64,
    pub open_breakers: i64,
    pub critical_alerts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthScore {
    pub score: u8,
    pub status: HealthStatus,
    pub details: HealthScoreDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthScoreDetails {
    pub servers: ServerHealthSummary,
    pub requests: RequestPerformanceSummary,
    pub circuit_breakers: i64,
    pub active_alerts: i64,
}

/// Compute the clamped score and derived status from raw signals.
///
/// An empty fleet (`total_servers == 0`) and an idle window
/// (`total_requests == 0`) both contribute zero penalty; the result is
/// always in `[0, 100]` and never NaN.
pub fn compute_health_score(signals: &HealthSignals) -> (u8, HealthStatus) {
    let healthy_ratio = if signals.total_servers > 0 {
        signals.healthy_servers as f64 / signals.total_servers as f64
    } else {
        1.0
    };

    let error_ratio = if signals.total_requests > 0 {
        signals.error_requests as f64 / signals.total_requests as f64
    } else {
        0.0
    };

    let raw = MAX_SCORE
        - SERVER_HEALTH_WEIGHT * (1.0 - healthy_ratio)
        - ERROR_RATE_WEIGHT * error_ratio
        - OPEN_BREAKER_WEIGHT * signals.open_breakers as f64
        - CRITICAL_ALERT_WEIGHT * signals.critical_alerts as f64;

    let score = raw.clamp(MIN_SCORE, MAX_SCORE).round() as u8;
    (score, status_for(score))
}

fn status_for(score: u8) -> HealthStatus {
    if score >= HEALTHY_THRESHOLD {
        HealthStatus::Healthy
    } else if score >= DEGRADED_THRESHOLD {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

/// Fetch the four signals and synthesize the score. The fetches are
/// read-only and mutually independent, so they run concurrently. Any
/// failing signal is logged and replaced by its zero-penalty default;
/// this function itself never fails.
pub async fn system_health_score(repo: &AnalyticsRepository) -> SystemHealthScore {
    let (servers, requests, breakers, alerts) = tokio::join!(
        repo.server_health_summary(),
        repo.request_performance_summary(1),
        repo.circuit_breaker_status(),
        repo.performance_alert_status(),
    );

    let servers = match servers {
        Ok(summary) => summary.unwrap_or_default(),
        Err(e) => {
            warn!("Server health unavailable, scoring without it: {}", e);
            ServerHealthSummary::default()
        }
    };

    let requests = match requests {
        Ok(summary) => summary.unwrap_or_default(),
        Err(e) => {
            warn!("Request performance unavailable, scoring without it: {}", e);
            RequestPerformanceSummary::default()
        }
    };

    let open_breakers = match breakers {
        Ok(breakers) => breakers.iter().filter(|b| b.is_open()).count() as i64,
        Err(e) => {
            warn!("Circuit breaker status unavailable, scoring without it: {}", e);
            0
        }
    };

    let critical_alerts = match alerts {
        Ok(alerts) => alerts.iter().filter(|a| a.is_active_critical()).count() as i64,
        Err(e) => {
            warn!("Alert status unavailable, scoring without it: {}", e);
            0
        }
    };

    let signals = HealthSignals {
        total_servers: servers.total_servers,
        healthy_servers: servers.healthy_servers,
        total_requests: requests.total_requests,
        error_requests: requests.error_requests,
        open_breakers,
        critical_alerts,
    };

    let (score, status) = compute_health_score(&signals);

    SystemHealthScore {
        score,
        status,
        details: HealthScoreDetails {
            servers,
            requests,
            circuit_breakers: open_breakers,
            active_alerts: critical_alerts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(
        total_servers: i64,
        healthy_servers: i64,
        total_requests: i64,
        error_requests: i64,
        open_breakers: i64,
        critical_alerts: i64,
    ) -> HealthSignals {
        HealthSignals {
            total_servers,
            healthy_servers,
            total_requests,
            error_requests,
            open_breakers,
            critical_alerts,
        }
    }

    #[test]
    fn test_all_green_scores_100() {
        let (score, status) = compute_health_score(&signals(10, 10, 1000, 0, 0, 0));
        assert_eq!(score, 100);
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn test_mixed_degradation_scores_55_unhealthy() {
        // healthy_ratio=0.5, error_ratio=0.2, one open breaker, one
        // critical alert: 100 - 15 - 5 - 10 - 15 = 55
        let (score, status) = compute_health_score(&signals(10, 5, 100, 20, 1, 1));
        assert_eq!(score, 55);
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_zero_denominators_carry_no_penalty() {
        let (score, status) = compute_health_score(&signals(0, 0, 0, 0, 0, 0));
        assert_eq!(score, 100);
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn test_score_is_clamped_to_zero() {
        let (score, status) = compute_health_score(&signals(10, 0, 100, 100, 5, 5));
        assert_eq!(score, 0);
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_status_thresholds() {
        // One open breaker: 100 - 10 = 90
        let (score, status) = compute_health_score(&signals(1, 1, 0, 0, 1, 0));
        assert_eq!(score, 90);
        assert_eq!(status, HealthStatus::Healthy);

        // Two open breakers: 80, still healthy at the boundary
        let (score, status) = compute_health_score(&signals(1, 1, 0, 0, 2, 0));
        assert_eq!(score, 80);
        assert_eq!(status, HealthStatus::Healthy);

        // Three open breakers: 70, degraded
        let (score, status) = compute_health_score(&signals(1, 1, 0, 0, 3, 0));
        assert_eq!(score, 70);
        assert_eq!(status, HealthStatus::Degraded);

        // Four open breakers: 60, still degraded at the boundary
        let (score, status) = compute_health_score(&signals(1, 1, 0, 0, 4, 0));
        assert_eq!(score, 60);
        assert_eq!(status, HealthStatus::Degraded);

        // Five open breakers: 50, unhealthy
        let (_, status) = compute_health_score(&signals(1, 1, 0, 0, 5, 0));
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_monotonic_in_breakers_and_alerts() {
        let mut last = 100;
        for breakers in 0..12 {
            let (score, _) = compute_health_score(&signals(10, 8, 100, 5, breakers, 0));
            assert!(score <= last, "score rose when breakers increased");
            last = score;
        }

        let mut last = 100;
        for alerts in 0..12 {
            let (score, _) = compute_health_score(&signals(10, 8, 100, 5, 0, alerts));
            assert!(score <= last, "score rose when alerts increased");
            last = score;
        }
    }
}
