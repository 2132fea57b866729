//! SurrealDB-backed specification store and architecture catalog
//!
//! Uses the rows in `schema` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle::{self, StoreConfig};
use crate::schema::{
    ArchitectureRecord, Catalog, DistributionRecord, RepositoryRecord, SpecificationRecord,
};
use crate::storage_traits::{
    Architecture, ArchitectureCatalog, Distribution, Repository, SpecId, SpecStatus,
    Specification, SpecificationStore, StorageResult,
};

/// SurrealDB-backed implementation of [`SpecificationStore`] and [`ArchitectureCatalog`].
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    /// Connect using an explicit configuration.
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        let db = handle::connect(config).await?;
        Ok(Self { db })
    }

    /// Connect using [`StoreConfig::from_env`].
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(&StoreConfig::from_env()).await
    }

    // -- seeding -------------------------------------------------------------

    /// Insert or replace a repository.
    pub async fn put_repository(&self, repository: &Repository) -> StorageResult<()> {
        let row = RepositoryRecord {
            id: None,
            name: repository.name.clone(),
        };
        self.db
            .query("DELETE repositories WHERE name = $name; CREATE repositories CONTENT $row;")
            .bind(("name", repository.name.clone()))
            .bind(("row", row))
            .await?
            .check()?;
        debug!(repository = %repository.name, "repository stored");
        Ok(())
    }

    /// Insert or replace a distribution.
    pub async fn put_distribution(&self, distribution: &Distribution) -> StorageResult<()> {
        let row = DistributionRecord {
            id: None,
            name: distribution.name.clone(),
            repository: distribution.repository.clone(),
        };
        self.db
            .query("DELETE distributions WHERE name = $name; CREATE distributions CONTENT $row;")
            .bind(("name", distribution.name.clone()))
            .bind(("row", row))
            .await?
            .check()?;
        debug!(distribution = %distribution.name, "distribution stored");
        Ok(())
    }

    /// Insert or replace an architecture of a repository.
    pub async fn put_architecture(&self, architecture: &Architecture) -> StorageResult<()> {
        let row = ArchitectureRecord {
            id: None,
            name: architecture.name.clone(),
            repository: architecture.repository.clone(),
            active: architecture.active,
        };
        self.db
            .query(
                "DELETE architectures WHERE repository = $repo AND name = $name; \
                 CREATE architectures CONTENT $row;",
            )
            .bind(("repo", architecture.repository.clone()))
            .bind(("name", architecture.name.clone()))
            .bind(("row", row))
            .await?
            .check()?;
        debug!(
            architecture = %architecture.name,
            repository = %architecture.repository,
            "architecture stored"
        );
        Ok(())
    }

    /// Insert or replace a specification, including its status.
    pub async fn put_specification(&self, spec: &Specification) -> StorageResult<()> {
        let row = SpecificationRecord::from(spec);
        self.db
            .query("DELETE specifications WHERE spec_id = $sid;")
            .query("CREATE specifications CONTENT $row;")
            .bind(("sid", spec.id.0.clone()))
            .bind(("row", row))
            .await?
            .check()?;
        debug!(spec_id = %spec.id, "specification stored");
        Ok(())
    }

    /// Store every record of a catalog document.
    pub async fn import(&self, catalog: &Catalog) -> StorageResult<()> {
        for repository in &catalog.repositories {
            self.put_repository(repository).await?;
        }
        for architecture in &catalog.architectures {
            self.put_architecture(architecture).await?;
        }
        for distribution in &catalog.distributions {
            self.put_distribution(distribution).await?;
        }
        for spec in &catalog.specifications {
            self.put_specification(spec).await?;
        }
        info!(
            repositories = catalog.repositories.len(),
            architectures = catalog.architectures.len(),
            distributions = catalog.distributions.len(),
            specifications = catalog.specifications.len(),
            "catalog imported"
        );
        Ok(())
    }

    // -- private helpers -----------------------------------------------------

    async fn repository_exists(&self, name: &str) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("SELECT * FROM repositories WHERE name = $name")
            .bind(("name", name.to_string()))
            .await?;
        let rows: Vec<RepositoryRecord> = res.take(0)?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl SpecificationStore for SurrealStore {
    async fn load(&self, id: &SpecId) -> StorageResult<Specification> {
        let mut res = self
            .db
            .query("SELECT * FROM specifications WHERE spec_id = $sid")
            .bind(("sid", id.0.clone()))
            .await?;

        let rows: Vec<SpecificationRecord> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(Specification::from)
            .ok_or_else(|| StorageError::SpecificationNotFound {
                spec_id: id.0.clone(),
            })
    }

    async fn update_status(&self, id: &SpecId, status: SpecStatus) -> StorageResult<()> {
        let mut res = self
            .db
            .query("UPDATE specifications SET status = $status WHERE spec_id = $sid")
            .bind(("status", status.code()))
            .bind(("sid", id.0.clone()))
            .await?;

        let updated: Vec<SpecificationRecord> = res.take(0)?;
        if updated.is_empty() {
            return Err(StorageError::SpecificationNotFound {
                spec_id: id.0.clone(),
            });
        }

        debug!(spec_id = %id, status = status.code(), "status updated");
        Ok(())
    }
}

#[async_trait]
impl ArchitectureCatalog for SurrealStore {
    async fn distribution(&self, name: &str) -> StorageResult<Distribution> {
        let mut res = self
            .db
            .query("SELECT * FROM distributions WHERE name = $name")
            .bind(("name", name.to_string()))
            .await?;

        let rows: Vec<DistributionRecord> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(Distribution::from)
            .ok_or_else(|| StorageError::DistributionNotFound {
                name: name.to_string(),
            })
    }

    async fn active_architectures(&self, repository: &str) -> StorageResult<Vec<Architecture>> {
        if !self.repository_exists(repository).await? {
            return Err(StorageError::RepositoryNotFound {
                name: repository.to_string(),
            });
        }

        let mut res = self
            .db
            .query(
                "SELECT * FROM architectures WHERE repository = $repo AND active = true \
                 ORDER BY name ASC",
            )
            .bind(("repo", repository.to_string()))
            .await?;

        let rows: Vec<ArchitectureRecord> = res.take(0)?;
        Ok(rows.into_iter().map(Architecture::from).collect())
    }
}
