//! Custom error types for metricregistry

use crate::version::VersionError;
use thiserror::Error;

/// Main error type for metricregistry operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("Not initialized: run 'metricregistry init' first")]
    NotInitialized,
}

/// Result type alias for metricregistry
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by the registration workflow.
///
/// Every persistence or validation failure inside a registration is
/// converted into one of these variants at the point where it happens, so
/// callers never see a raw `sqlx::Error`.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed while checking if metric exists: {0}")]
    ExistenceCheck(String),

    #[error("failed while getting previous version: {0}")]
    VersionRead(String),

    #[error("failed while updating metric with latest version: {0}")]
    VersionUpdate(String),

    #[error("failed while inserting into {table}: {message}")]
    Insert {
        table: &'static str,
        message: String,
    },

    #[error("metric '{0}' was registered concurrently; retry the registration")]
    Conflict(String),

    #[error("invalid registration request: {0}")]
    Validation(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("error while adding the model: {0}")]
    Registration(String),
}

impl RegistryError {
    /// Wrap a failed insert, reporting unique-key violations as conflicts
    pub(crate) fn insert(table: &'static str, name: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RegistryError::Conflict(name.to_string());
            }
        }
        RegistryError::Insert {
            table,
            message: err.to_string(),
        }
    }
}
