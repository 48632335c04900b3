pub mod connection;
pub mod migrations;
pub mod views;

pub use connection::{resolve_ssl_mode, LocalPoolStats, RegistryPool};
pub use migrations::{execute_idempotent, MigrationReport, MigrationRunner};
pub use views::{ViewDefinition, ViewKind, ViewLifecycleReport, ViewRegistry, VIEW_CATALOG};
