//! Error types for irgsh-state

use thiserror::Error;

/// Errors raised by specification and catalog stores
#[derive(Error, Debug)]
pub enum StorageError {
    /// No specification with the given identifier
    #[error("Specification not found: {spec_id}")]
    SpecificationNotFound { spec_id: String },

    /// No distribution with the given name
    #[error("Distribution not found: {name}")]
    DistributionNotFound { name: String },

    /// No repository with the given name
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Backend query or (de)serialization failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether this error means the requested record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::SpecificationNotFound { .. }
                | StorageError::DistributionNotFound { .. }
                | StorageError::RepositoryNotFound { .. }
        )
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
