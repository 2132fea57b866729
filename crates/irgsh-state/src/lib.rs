//! irgsh-state: Specification and catalog storage for the irgsh dispatcher
//!
//! This crate owns the data model the dispatcher works on and the store
//! seams it reads and writes through.
//!
//! ## Key Components
//!
//! - `SpecificationStore`: load a specification, targeted status update
//! - `ArchitectureCatalog`: Specification → Distribution → Repository → active Architectures
//! - `SurrealStore`: SurrealDB-backed implementation of both
//! - `fakes::MemoryStore`: in-memory implementation for tests

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::StorageError;
pub use handle::{connect, RemoteAuth, StoreConfig};
pub use schema::{
    ArchitectureRecord, Catalog, DistributionRecord, RepositoryRecord, SpecificationRecord,
};
pub use storage_traits::{
    Architecture, ArchitectureCatalog, Distribution, Repository, SpecId, SpecStatus,
    Specification, SpecificationStore, StorageResult,
};
pub use surreal_store::SurrealStore;
