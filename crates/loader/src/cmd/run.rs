//! Run command - the consumer loop
//!
//! Wires configuration into components, installs signal handling, and
//! drives either the per-envelope CAS loader or the bulk loader until
//! shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kaijs_config::{Config, StoreBackend};
use kaijs_filequeue::{FileQueue, FileQueueConfig};
use kaijs_pipeline::{
    BulkConfig, BulkLoader, HttpKojiHub, KojiHubs, Loader, LoaderMetrics, PipelineError, Updater,
};
use kaijs_routing::HandlerRegistry;
use kaijs_schema::{spawn_refresher, SchemaSnapshot, SchemaStore};
use kaijs_store::{DocStore, IndexSpec, MemoryStore, SearchStore, SearchStoreConfig, SidelineStores};

/// Run command arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/loader.toml")]
    pub config: PathBuf,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("configs/loader.toml"),
        }
    }
}

/// Run the consumer loop
pub async fn run(args: RunArgs) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "kaijs-loader starting"
    );

    let config = load_config(&args.config)?;

    if let Err(e) = run_loader(config).await {
        error!(error = %e, "loader error");
        return Err(e);
    }

    info!("kaijs-loader shutdown complete");
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        Config::from_file(path).context("failed to load configuration")
    } else {
        info!(config = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

async fn run_loader(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    // Document store
    let store: Arc<dyn DocStore> = match config.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory document store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Search => {
            info!(url = %config.store.url, "using search document store");
            Arc::new(
                SearchStore::new(SearchStoreConfig {
                    url: config.store.url.clone(),
                    username: config.store.username.clone(),
                    password: config.store.password.clone(),
                    artifacts_index: config.store.artifacts.clone(),
                    timeout: config.store.timeout,
                })
                .context("failed to build search store")?,
            )
        }
    };

    // Collection lifecycle: reconcile artifact indexes, ensure sidelines.
    let indexes: Vec<IndexSpec> = config
        .store
        .indexes
        .iter()
        .map(|idx| IndexSpec::new(&idx.name, &idx.field, idx.unique))
        .collect();
    store
        .open_collection(&config.store.artifacts, &indexes)
        .await
        .context("failed to open artifacts collection")?;
    store
        .open_collection(&config.store.invalid, &[])
        .await
        .context("failed to open invalid collection")?;
    store
        .open_collection(&config.store.unknown, &[])
        .await
        .context("failed to open unknown-topic collection")?;
    if config.bulk.enabled {
        store
            .open_collection(&config.store.artifact_states, &[])
            .await
            .context("failed to open artifact-states collection")?;
    }

    // File queue
    let queue = FileQueue::open(
        &config.filequeue.dir,
        FileQueueConfig {
            poll: config.filequeue.poll,
            optimize_list: config.filequeue.optimize_list,
        },
    )
    .context("failed to open file queue")?;
    info!(
        dir = %config.filequeue.dir,
        visible = queue.length().unwrap_or(0),
        "file queue open"
    );

    // Schema snapshot and refresher
    let schemas = Arc::new(SchemaStore::new(SchemaSnapshot::builtin()));
    let refresher = if config.schemas.dir.is_empty() {
        info!("no schema directory configured, using builtin schemas");
        None
    } else {
        info!(
            dir = %config.schemas.dir,
            refresh = ?config.schemas.refresh,
            "schema refresher starting"
        );
        Some(spawn_refresher(
            Arc::clone(&schemas),
            PathBuf::from(&config.schemas.dir),
            config.schemas.refresh,
            cancel.clone(),
        ))
    };

    // Koji hubs
    let hubs = KojiHubs::new(
        Arc::new(
            HttpKojiHub::new(&config.koji.fedora_url, config.koji.timeout)
                .context("failed to build fedora hub client")?,
        ),
        Arc::new(
            HttpKojiHub::new(&config.koji.centos_url, config.koji.timeout)
                .context("failed to build centos hub client")?,
        ),
    );

    let registry = HandlerRegistry::with_default_routes();
    let sidelines = SidelineStores::with_collections(
        Arc::clone(&store),
        config.store.invalid.clone(),
        config.store.unknown.clone(),
    );
    let metrics = Arc::new(LoaderMetrics::new());

    // Consumer loop, spawned so shutdown can bound its drain time.
    let loader_task: JoinHandle<std::result::Result<(), PipelineError>> = if config.bulk.enabled {
        info!(
            max_entries = config.bulk.max_entries,
            max_bytes = config.bulk.max_bytes,
            idle = ?config.bulk.idle,
            "running bulk loader"
        );
        let bulk = BulkLoader::new(
            queue.clone(),
            Arc::clone(&store),
            Arc::clone(&schemas),
            registry,
            hubs,
            sidelines,
            BulkConfig {
                max_entries: config.bulk.max_entries,
                max_bytes: config.bulk.max_bytes,
                idle: config.bulk.idle,
                artifacts_collection: config.store.artifacts.clone(),
                states_collection: config.store.artifact_states.clone(),
            },
            Arc::clone(&metrics),
        );
        let token = cancel.clone();
        tokio::spawn(async move { bulk.run(token).await })
    } else {
        info!("running stream loader");
        let updater = Updater::new(
            Arc::clone(&store),
            Arc::clone(&schemas),
            registry,
            hubs,
            sidelines,
            Arc::clone(&metrics),
        );
        let loader = Loader::new(queue.clone(), updater);
        let token = cancel.clone();
        tokio::spawn(async move { loader.run(token).await })
    };

    let result = await_with_shutdown(loader_task, &cancel, config.global.shutdown_timeout).await;

    // Stop background tasks and release connections regardless of outcome.
    cancel.cancel();
    if let Some(task) = refresher {
        task.abort();
    }
    if let Err(e) = store.close().await {
        error!(error = %e, "error closing store");
    }

    let snap = metrics.snapshot();
    let queue_snap = queue.metrics();
    info!(
        processed = snap.processed,
        updated = snap.updated,
        unchanged = snap.unchanged,
        invalid = snap.invalid,
        unknown_topic = snap.unknown_topic,
        rollbacks = snap.rollbacks,
        cas_retries = snap.cas_retries,
        bulk_flushes = snap.bulk_flushes,
        commits = queue_snap.commits,
        "loader finished"
    );

    result
}

/// Wait for the loader to finish, or for a shutdown signal.
///
/// On a signal the loader gets the configured grace period to settle its
/// in-flight envelope (and, in bulk mode, flush or roll back its batch);
/// overrunning it is a fatal error so the supervisor restarts cleanly.
async fn await_with_shutdown(
    mut task: JoinHandle<std::result::Result<(), PipelineError>>,
    cancel: &CancellationToken,
    grace: Duration,
) -> Result<()> {
    tokio::select! {
        res = &mut task => flatten_join(res),
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, stopping loader...");
            cancel.cancel();
            match tokio::time::timeout(grace, task).await {
                Ok(res) => flatten_join(res),
                Err(_) => {
                    warn!(grace = ?grace, "loader did not stop within the shutdown timeout");
                    Err(anyhow::anyhow!("loader did not stop within the shutdown timeout"))
                }
            }
        }
    }
}

fn flatten_join(
    res: std::result::Result<std::result::Result<(), PipelineError>, tokio::task::JoinError>,
) -> Result<()> {
    match res {
        Ok(inner) => inner.context("loader failed"),
        Err(e) => Err(anyhow::anyhow!("loader task panicked: {}", e)),
    }
}

/// Wait for SIGINT, SIGTERM, or SIGABRT
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    // SIGABRT (6) has no named SignalKind constructor.
    #[cfg(unix)]
    let abort = async {
        signal::unix::signal(signal::unix::SignalKind::from_raw(6))
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(not(unix))]
    let abort = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = abort => {},
    }
}
