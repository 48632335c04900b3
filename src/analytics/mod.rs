pub mod health_score;
pub mod models;
pub mod queries;

pub use health_score::{
    compute_health_score, system_health_score, HealthSignals, HealthStatus, SystemHealthScore,
};
pub use models::*;
pub use queries::AnalyticsRepository;
