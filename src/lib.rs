pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod maintenance;

pub use config::Config;
pub use error::{RegistryDbError, Result};

// Re-export connection and lifecycle types for convenience
pub use db::{
    resolve_ssl_mode, MigrationReport, MigrationRunner, RegistryPool, ViewLifecycleReport,
    ViewRegistry,
};

// Re-export analytics types
pub use analytics::{
    compute_health_score, system_health_score, AnalyticsRepository, HealthSignals, HealthStatus,
    SystemHealthScore,
};

// Re-export maintenance types
pub use maintenance::{
    IndexUsage, IndexUsageReport, MaintenanceRunner, RegistryHealth, SlowQueryInfo,
};
