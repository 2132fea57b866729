//! irgsh - build dispatcher command-line interface
//!
//! ## Commands
//!
//! - `init`: declare builder queues for a specification and start its builds
//! - `upload`: transfer a built specification to the repository host
//! - `declare`: declare builder queues for the given architectures
//! - `files`: list the files named by a source package manifest
//! - `import`: seed the store from a catalog document
//! - `status`: show or set a specification's status code

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use irgsh_dispatch::{
    declare_all, manifest_files, AmqpConnector, AmqpFanout, BrokerConnector, BuildFanout,
    DispatchConfig, FileTransport, ScpTransport, SpecInitializer, StatusTracker, UploadDispatcher,
};
use irgsh_state::{Catalog, SpecId, SpecStatus, SpecificationStore, SurrealStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "irgsh")]
#[command(author = "irgsh developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Distributed Debian package build dispatcher", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// AMQP broker URI
    #[arg(long, global = true, env = "IRGSH_BROKER_URL")]
    broker_url: Option<String>,

    /// Root directory holding per-specification build artifacts
    #[arg(long, global = true, env = "IRGSH_DOWNLOAD_ROOT")]
    download_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Declare builder topology for a specification and start its build fan-out
    Init {
        /// Specification identifier
        spec_id: String,
    },

    /// Upload a built specification's source package to the repository host
    Upload {
        /// Specification identifier
        spec_id: String,
    },

    /// Declare builder queues for architectures without touching the store
    Declare {
        /// Architecture names (e.g. amd64 i386)
        #[arg(required = true)]
        architectures: Vec<String>,
    },

    /// List the files named in a manifest's `Files:` section
    Files {
        /// Path to the `.dsc` manifest
        manifest: PathBuf,
    },

    /// Load repositories, distributions, architectures and specifications from JSON
    Import {
        /// Catalog document
        catalog: PathBuf,
    },

    /// Show a specification's status, or set it with --set
    Status {
        /// Specification identifier
        spec_id: String,

        /// New status code
        #[arg(long, allow_negative_numbers = true)]
        set: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    irgsh_dispatch::telemetry::init_tracing(cli.json, level);

    let mut config = DispatchConfig::from_env();
    if let Some(url) = cli.broker_url {
        config.broker.url = url;
    }
    if let Some(root) = cli.download_root {
        config.download_root = root;
    }

    match cli.command {
        Commands::Init { spec_id } => {
            let store = Arc::new(open_store().await?);
            cmd_init(
                store,
                Arc::new(AmqpConnector::new(&config.broker)),
                Arc::new(AmqpFanout::new(&config.broker)),
                &spec_id,
            )
            .await
        }
        Commands::Upload { spec_id } => {
            let store = Arc::new(open_store().await?);
            let transport = Arc::new(ScpTransport::new(config.upload.clone()));
            cmd_upload(config, store, transport, &spec_id).await
        }
        Commands::Declare { architectures } => {
            cmd_declare(&AmqpConnector::new(&config.broker), &architectures).await
        }
        Commands::Files { manifest } => cmd_files(&manifest),
        Commands::Import { catalog } => cmd_import(&open_store().await?, &catalog).await,
        Commands::Status { spec_id, set } => {
            let store = Arc::new(open_store().await?);
            cmd_status(store, &spec_id, set).await
        }
    }
}

async fn open_store() -> Result<SurrealStore> {
    SurrealStore::from_env()
        .await
        .context("Failed to connect to irgsh database")
}

/// Declare topology for a specification and hand it to the build fan-out
async fn cmd_init(
    store: Arc<SurrealStore>,
    connector: Arc<dyn BrokerConnector>,
    fanout: Arc<dyn BuildFanout>,
    spec_id: &str,
) -> Result<()> {
    let initializer = SpecInitializer::new(store.clone(), store, connector, fanout);
    let outcome = initializer
        .run(&SpecId::new(spec_id))
        .await
        .with_context(|| format!("Failed to initialize specification '{spec_id}'"))?;

    for topology in &outcome.topologies {
        println!(
            "declared {} <- {} ({})",
            topology.queue, topology.exchange, topology.routing_key
        );
    }
    // publishing runs in the background; wait for it before the process exits
    outcome.fanout.settle().await;
    println!(
        "Dispatched {} to {} architecture(s)",
        outcome.spec_id,
        outcome.architectures.len()
    );
    Ok(())
}

/// Upload one specification and report the files sent
async fn cmd_upload(
    config: DispatchConfig,
    store: Arc<SurrealStore>,
    transport: Arc<dyn FileTransport>,
    spec_id: &str,
) -> Result<()> {
    let dispatcher = UploadDispatcher::new(config, store, transport);
    let outcome = dispatcher
        .run(&SpecId::new(spec_id))
        .await
        .with_context(|| format!("Failed to upload specification '{spec_id}'"))?;

    for file in &outcome.files {
        println!("{}", file.display());
    }
    println!(
        "Uploaded {} file(s) for {} (status {})",
        outcome.files.len(),
        outcome.spec_id,
        SpecStatus::UPLOADED
    );
    Ok(())
}

async fn cmd_declare(connector: &dyn BrokerConnector, architectures: &[String]) -> Result<()> {
    let declared = declare_all(connector, architectures.iter().map(String::as_str))
        .await
        .context("Failed to declare builder topology")?;
    for topology in declared {
        println!("{} <- {} ({})", topology.queue, topology.exchange, topology.routing_key);
    }
    Ok(())
}

fn cmd_files(manifest: &Path) -> Result<()> {
    let files = manifest_files(manifest)?;
    for file in files {
        println!("{file}");
    }
    Ok(())
}

async fn cmd_import(store: &SurrealStore, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let catalog = Catalog::from_json(&text).context("Invalid catalog document")?;
    store.import(&catalog).await?;

    println!(
        "Imported {} repositories, {} distributions, {} architectures, {} specifications",
        catalog.repositories.len(),
        catalog.distributions.len(),
        catalog.architectures.len(),
        catalog.specifications.len()
    );
    Ok(())
}

async fn cmd_status(store: Arc<SurrealStore>, spec_id: &str, set: Option<i32>) -> Result<()> {
    let id = SpecId::new(spec_id);
    if let Some(code) = set {
        StatusTracker::new(store.clone())
            .set(&id, SpecStatus(code))
            .await?;
    }

    let spec = store
        .load(&id)
        .await
        .with_context(|| format!("Specification '{spec_id}' not found"))?;
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}
