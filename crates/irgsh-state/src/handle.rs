//! SurrealDB connection setup
//!
//! Supports in-memory, local (surrealkv) and remote (WebSocket) connections.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StorageError;
use crate::migrations;
use crate::StorageResult;

const DEFAULT_NAMESPACE: &str = "irgsh";
const DEFAULT_DATABASE: &str = "main";
const DEFAULT_LOCAL_PATH: &str = ".irgsh/db";

/// Credentials for an authenticated remote SurrealDB
#[derive(Debug, Clone)]
pub struct RemoteAuth {
    pub username: String,
    pub password: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

/// Where and how to connect to the store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Engine endpoint (`mem://`, `surrealkv://path`, `ws://host:port`, ...)
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub auth: Option<RemoteAuth>,
}

impl StoreConfig {
    /// Configuration for an unauthenticated endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            auth: None,
        }
    }

    /// Volatile in-memory store
    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(RemoteAuth {
            username: username.into(),
            password: password.into(),
            is_root: false,
        });
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        if let Some(auth) = self.auth.as_mut() {
            auth.is_root = is_root;
        }
        self
    }

    /// Resolve from environment variables
    ///
    /// Reads, in order of preference:
    /// - SURREALDB_ENDPOINT + SURREALDB_USERNAME + SURREALDB_PASSWORD (remote, authenticated;
    ///   SURREALDB_ROOT=true for root users)
    /// - SURREALDB_URL (any engine, unauthenticated)
    /// - otherwise local persistence in `.irgsh/db`
    ///
    /// SURREALDB_NAMESPACE and SURREALDB_DATABASE override the defaults in every case.
    pub fn from_env() -> Self {
        let remote = (
            std::env::var("SURREALDB_ENDPOINT"),
            std::env::var("SURREALDB_USERNAME"),
            std::env::var("SURREALDB_PASSWORD"),
        );

        let mut config = match remote {
            (Ok(endpoint), Ok(username), Ok(password)) => {
                let is_root = std::env::var("SURREALDB_ROOT")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                Self::new(endpoint)
                    .with_auth(username, password)
                    .with_root(is_root)
            }
            _ => match std::env::var("SURREALDB_URL") {
                Ok(url) => Self::new(url),
                Err(_) => Self::new(format!("surrealkv://{}", DEFAULT_LOCAL_PATH)),
            },
        };

        if let Ok(ns) = std::env::var("SURREALDB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Ok(db) = std::env::var("SURREALDB_DATABASE") {
            config.database = db;
        }
        config
    }
}

/// Connect, authenticate, select namespace/database and initialise the schema.
#[instrument(
    skip(config),
    fields(
        endpoint = %config.endpoint,
        namespace = %config.namespace,
        database = %config.database
    )
)]
pub async fn connect(config: &StoreConfig) -> StorageResult<Surreal<Any>> {
    if let Some(path) = config.endpoint.strip_prefix("surrealkv://") {
        std::fs::create_dir_all(path).map_err(|e| {
            StorageError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
    }

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StorageError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if let Some(auth) = &config.auth {
        if auth.is_root {
            db.signin(Root {
                username: &auth.username,
                password: &auth.password,
            })
            .await
            .map_err(|e| StorageError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &auth.username,
                password: &auth.password,
            })
            .await
            .map_err(|e| StorageError::Connection(format!("DB auth failed: {e}")))?;
        }
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;

    info!("SurrealDB connected");
    Ok(db)
}
