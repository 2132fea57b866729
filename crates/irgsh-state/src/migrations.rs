//! SurrealDB schema migrations and initialization
//!
//! Sets up the catalog tables with their unique indexes.

use crate::StorageResult;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all irgsh tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing irgsh SurrealDB schema");

    init_repositories_table(db).await?;
    init_distributions_table(db).await?;
    init_architectures_table(db).await?;
    init_specifications_table(db).await?;

    info!("irgsh schema initialization complete");
    Ok(())
}

async fn init_repositories_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing repositories table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS repositories SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_repository_name ON TABLE repositories COLUMNS name UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

async fn init_distributions_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing distributions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS distributions SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_distribution_name ON TABLE distributions COLUMNS name UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

/// Schema:
/// ```text
/// TABLE architectures {
///   name:       STRING
///   repository: STRING (indexed)
///   active:     BOOL
/// }
/// ```
///
/// `(repository, name)` is unique.
async fn init_architectures_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing architectures table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS architectures SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_arch_repo_name ON TABLE architectures
            COLUMNS repository, name UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_arch_repo ON TABLE architectures COLUMNS repository;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

/// Schema:
/// ```text
/// TABLE specifications {
///   spec_id:      STRING (unique)
///   distribution: STRING
///   source:       STRING
///   version:      STRING
///   status:       INT
/// }
/// ```
///
/// `status` is only ever changed through targeted `UPDATE ... SET status`.
async fn init_specifications_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing specifications table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS specifications SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_spec_id ON TABLE specifications COLUMNS spec_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_spec_distribution ON TABLE specifications
            COLUMNS distribution;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}
