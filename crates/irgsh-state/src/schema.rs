//! Schema definitions for irgsh SurrealDB tables
//!
//! Tables:
//! - specifications: Build requests and their lifecycle status
//! - distributions: Distribution → repository pointers
//! - architectures: Per-repository build platforms and their active flag
//!
//! Rows carry the SurrealDB record ID and are converted to the
//! `storage_traits` types at the store boundary.

use serde::{Deserialize, Serialize};

use crate::storage_traits::{
    Architecture, Distribution, Repository, SpecId, SpecStatus, Specification,
};

/// Specification row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificationRecord {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Opaque specification identifier (unique)
    pub spec_id: String,
    pub distribution: String,
    pub source: String,
    pub version: String,
    pub status: i32,
}

impl From<&Specification> for SpecificationRecord {
    fn from(spec: &Specification) -> Self {
        SpecificationRecord {
            id: None,
            spec_id: spec.id.0.clone(),
            distribution: spec.distribution.clone(),
            source: spec.source.clone(),
            version: spec.version.clone(),
            status: spec.status.code(),
        }
    }
}

impl From<SpecificationRecord> for Specification {
    fn from(row: SpecificationRecord) -> Self {
        Specification {
            id: SpecId(row.spec_id),
            distribution: row.distribution,
            source: row.source,
            version: row.version,
            status: SpecStatus(row.status),
        }
    }
}

/// Repository row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub name: String,
}

impl From<RepositoryRecord> for Repository {
    fn from(row: RepositoryRecord) -> Self {
        Repository { name: row.name }
    }
}

/// Distribution row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub name: String,
    pub repository: String,
}

impl From<DistributionRecord> for Distribution {
    fn from(row: DistributionRecord) -> Self {
        Distribution {
            name: row.name,
            repository: row.repository,
        }
    }
}

/// Architecture row; `(repository, name)` is unique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub name: String,
    pub repository: String,
    pub active: bool,
}

impl From<ArchitectureRecord> for Architecture {
    fn from(row: ArchitectureRecord) -> Self {
        Architecture {
            name: row.name,
            repository: row.repository,
            active: row.active,
        }
    }
}

/// Seed document for bulk import (`irgsh import catalog.json`)
///
/// ```json
/// {
///   "repositories": [{"name": "main"}],
///   "architectures": [{"name": "amd64", "repository": "main", "active": true}],
///   "distributions": [{"name": "arok", "repository": "main"}],
///   "specifications": [{"id": "S1", "distribution": "arok", "source": "pkg", "version": "1.0"}]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub architectures: Vec<Architecture>,
    #[serde(default)]
    pub distributions: Vec<Distribution>,
    #[serde(default)]
    pub specifications: Vec<Specification>,
}

impl Catalog {
    /// Parse a catalog from JSON text.
    pub fn from_json(text: &str) -> crate::StorageResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
