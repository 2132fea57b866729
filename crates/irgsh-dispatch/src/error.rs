//! Dispatch error taxonomy.
//!
//! Every fatal condition of an orchestrator run maps to exactly one variant;
//! the task runtime only needs [`DispatchError::kind`] to decide what to do.

use irgsh_state::StorageError;
use std::path::PathBuf;

/// Coarse classification used in the `Ok` / `Err(kind)` run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    MalformedManifest,
    Topology,
    Transfer,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::MalformedManifest => "malformed_manifest",
            ErrorKind::Topology => "topology",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Storage => "storage",
        };
        f.write_str(s)
    }
}

/// Errors produced by the dispatcher orchestrators.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Specification (or the distribution/repository it points to) does not resolve
    #[error("not found: {0}")]
    NotFound(StorageError),

    /// Manifest missing, unreadable, or with an unparseable `Files:` record
    #[error("malformed manifest {}: {reason}", path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    /// Broker unreachable or topology declaration rejected
    #[error("topology declaration failed for architecture {architecture}: {reason}")]
    TopologyError {
        architecture: String,
        reason: String,
    },

    /// Non-zero exit or transport failure while transferring files
    #[error(
        "transfer failed{}: {reason}",
        exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default()
    )]
    TransferError {
        exit_code: Option<i32>,
        reason: String,
    },

    /// Store failure other than a missing record (e.g. a rejected status write)
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::NotFound(_) => ErrorKind::NotFound,
            DispatchError::MalformedManifest { .. } => ErrorKind::MalformedManifest,
            DispatchError::TopologyError { .. } => ErrorKind::Topology,
            DispatchError::TransferError { .. } => ErrorKind::Transfer,
            DispatchError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn topology(architecture: &str, reason: impl std::fmt::Display) -> Self {
        DispatchError::TopologyError {
            architecture: architecture.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(path: &std::path::Path, reason: impl Into<String>) -> Self {
        DispatchError::MalformedManifest {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for DispatchError {
    fn from(err: StorageError) -> Self {
        if err.is_not_found() {
            DispatchError::NotFound(err)
        } else {
            DispatchError::Storage(err)
        }
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
