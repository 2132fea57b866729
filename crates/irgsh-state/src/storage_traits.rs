//! Storage trait definitions for the irgsh dispatcher
//!
//! These traits define the two store seams the orchestrators depend on:
//! - `SpecificationStore`: load a specification, targeted status update
//! - `ArchitectureCatalog`: Specification → Distribution → Repository → active Architectures
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identity and status
// ---------------------------------------------------------------------------

/// Opaque, stable specification identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecId(pub String);

impl SpecId {
    pub fn new(id: impl Into<String>) -> Self {
        SpecId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SpecId {
    fn from(s: &str) -> Self {
        SpecId(s.to_string())
    }
}

/// Specification lifecycle status code.
///
/// Codes are opaque integers shared with the presentation layer. Only
/// [`SpecStatus::UPLOADED`] and [`SpecStatus::FAILED`] are written by the
/// dispatcher itself; every other code is carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecStatus(pub i32);

impl SpecStatus {
    /// Source package uploaded to the repository host, pending remote acceptance
    pub const UPLOADED: SpecStatus = SpecStatus(104);
    /// Terminal failure
    pub const FAILED: SpecStatus = SpecStatus(-1);

    pub fn code(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single build request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub id: SpecId,
    /// Name of the distribution this build targets
    pub distribution: String,
    /// Source package name
    pub source: String,
    /// Full Debian version, possibly with an epoch (`1:2.0-1`)
    pub version: String,
    #[serde(default)]
    pub status: SpecStatus,
}

impl Specification {
    /// File name of the source package control document (`<source>_<version>.dsc`).
    ///
    /// The epoch never appears in Debian file names, so it is stripped.
    pub fn manifest_name(&self) -> String {
        let version = match self.version.split_once(':') {
            Some((_epoch, upstream)) => upstream,
            None => self.version.as_str(),
        };
        format!("{}_{}.dsc", self.source, version)
    }
}

/// A package repository owning a set of architectures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
}

/// A distribution, referencing exactly one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub name: String,
    pub repository: String,
}

/// A target build platform belonging to one repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Architecture {
    pub name: String,
    pub repository: String,
    /// Whether the architecture is eligible for dispatch
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Specification persistence.
///
/// Guarantees:
/// - `load` returns `SpecificationNotFound` for unknown identifiers.
/// - `update_status` is a targeted write of the status field only; it does
///   not read-modify-write the full record. Writing the same status twice is
///   indistinguishable from writing it once.
/// - No transition validation and no concurrency guard: the last writer wins.
#[async_trait]
pub trait SpecificationStore: Send + Sync {
    /// Load a specification by identifier.
    async fn load(&self, id: &SpecId) -> StorageResult<Specification>;

    /// Set the status field of a specification.
    async fn update_status(&self, id: &SpecId, status: SpecStatus) -> StorageResult<()>;
}

/// Read access to the distribution / repository / architecture graph.
#[async_trait]
pub trait ArchitectureCatalog: Send + Sync {
    /// Look up a distribution by name.
    async fn distribution(&self, name: &str) -> StorageResult<Distribution>;

    /// All active architectures of a repository.
    async fn active_architectures(&self, repository: &str) -> StorageResult<Vec<Architecture>>;

    /// Traverse from a specification to the active architectures of its repository.
    async fn active_architectures_for(
        &self,
        spec: &Specification,
    ) -> StorageResult<Vec<Architecture>> {
        let distribution = self.distribution(&spec.distribution).await?;
        self.active_architectures(&distribution.repository).await
    }
}
