use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryDbError {
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("SSL configuration error: {0}")]
    SslConfig(String),

    #[error("Schema operation failed on {object}: {message}")]
    Schema { object: String, message: String },

    #[error("Migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    #[error("Extension not available: {0}")]
    ExtensionUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, RegistryDbError>;
