//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryStore`, which satisfies both the `SpecificationStore` and
//! `ArchitectureCatalog` contracts without any external dependencies, and
//! records every status write so tests can assert on ordering.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::Catalog;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    repositories: HashMap<String, Repository>,
    distributions: HashMap<String, Distribution>,
    /// repository → (architecture name → architecture)
    architectures: HashMap<String, BTreeMap<String, Architecture>>,
    specifications: HashMap<SpecId, Specification>,
    status_writes: Vec<(SpecId, SpecStatus)>,
    rejected_statuses: Vec<SpecStatus>,
}

/// In-memory specification store and architecture catalog.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a catalog document.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let store = Self::new();
        for repository in &catalog.repositories {
            store.put_repository(repository.clone());
        }
        for architecture in &catalog.architectures {
            store.put_architecture(architecture.clone());
        }
        for distribution in &catalog.distributions {
            store.put_distribution(distribution.clone());
        }
        for spec in &catalog.specifications {
            store.put_specification(spec.clone());
        }
        store
    }

    pub fn put_repository(&self, repository: Repository) {
        let mut tables = self.tables.lock().unwrap();
        tables
            .repositories
            .insert(repository.name.clone(), repository);
    }

    pub fn put_distribution(&self, distribution: Distribution) {
        let mut tables = self.tables.lock().unwrap();
        tables
            .distributions
            .insert(distribution.name.clone(), distribution);
    }

    pub fn put_architecture(&self, architecture: Architecture) {
        let mut tables = self.tables.lock().unwrap();
        tables
            .architectures
            .entry(architecture.repository.clone())
            .or_default()
            .insert(architecture.name.clone(), architecture);
    }

    pub fn put_specification(&self, spec: Specification) {
        let mut tables = self.tables.lock().unwrap();
        tables.specifications.insert(spec.id.clone(), spec);
    }

    /// Current status of a specification, if it exists.
    pub fn status_of(&self, id: &SpecId) -> Option<SpecStatus> {
        let tables = self.tables.lock().unwrap();
        tables.specifications.get(id).map(|s| s.status)
    }

    /// Make every later write of `status` fail with a backend error.
    pub fn reject_status(&self, status: SpecStatus) {
        self.tables.lock().unwrap().rejected_statuses.push(status);
    }

    /// Every successful status write, in the order it happened.
    pub fn status_writes(&self) -> Vec<(SpecId, SpecStatus)> {
        let tables = self.tables.lock().unwrap();
        tables.status_writes.clone()
    }
}

#[async_trait]
impl SpecificationStore for MemoryStore {
    async fn load(&self, id: &SpecId) -> StorageResult<Specification> {
        let tables = self.tables.lock().unwrap();
        tables
            .specifications
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::SpecificationNotFound {
                spec_id: id.0.clone(),
            })
    }

    async fn update_status(&self, id: &SpecId, status: SpecStatus) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if tables.rejected_statuses.contains(&status) {
            return Err(StorageError::Backend(format!(
                "status write {status} rejected for {id}"
            )));
        }
        let spec =
            tables
                .specifications
                .get_mut(id)
                .ok_or_else(|| StorageError::SpecificationNotFound {
                    spec_id: id.0.clone(),
                })?;
        spec.status = status;
        tables.status_writes.push((id.clone(), status));
        Ok(())
    }
}

#[async_trait]
impl ArchitectureCatalog for MemoryStore {
    async fn distribution(&self, name: &str) -> StorageResult<Distribution> {
        let tables = self.tables.lock().unwrap();
        tables
            .distributions
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::DistributionNotFound {
                name: name.to_string(),
            })
    }

    async fn active_architectures(&self, repository: &str) -> StorageResult<Vec<Architecture>> {
        let tables = self.tables.lock().unwrap();
        if !tables.repositories.contains_key(repository) {
            return Err(StorageError::RepositoryNotFound {
                name: repository.to_string(),
            });
        }
        Ok(tables
            .architectures
            .get(repository)
            .map(|archs| archs.values().filter(|a| a.active).cloned().collect())
            .unwrap_or_default())
    }
}
