//! dlab-ci - Compendium Import service
//!
//! Accepts compendium archives over HTTP, converts their content into
//! platform documents, and reports job progress by polling and SSE.

use anyhow::{Context, Result};
use clap::Parser;
use dlab_common::config::{default_config_path, load_toml_or_default, RootFolderInitializer, RootFolderResolver};
use dlab_common::events::EventBus;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dlab_ci::config::{CiTomlConfig, ImportSettings, StorageBackend, DEFAULT_PORT, MODULE_NAME};
use dlab_ci::converters::ConverterRegistry;
use dlab_ci::services::ImportPipeline;
use dlab_ci::AppState;

#[derive(Debug, Parser)]
#[command(name = "dlab-ci", version, about = "Dungeon Lab compendium import service")]
struct Args {
    /// Root folder holding the database and local assets
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "DLAB_CI_PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(long, env = "DLAB_CI_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// TOML config file (default: ~/.config/dlab/dlab-ci.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let toml_config: CiTomlConfig = load_toml_or_default(config_path.as_deref());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dlab-ci (Compendium Import) service");
    info!(
        "Version: {} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    // Step 1: Resolve and create the root folder
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml_value(toml_config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    // Step 2: Open the database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = dlab_ci::db::init_database_pool(&db_path).await?;

    // Step 3: Runtime tunables and stale job cleanup
    let settings = ImportSettings::resolve(&db_pool, &toml_config.import).await?;
    let stale = dlab_ci::db::jobs::mark_stale_jobs_failed(&db_pool, settings.database_max_lock_wait_ms).await?;
    if stale > 0 {
        info!(stale, "Marked interrupted import jobs as failed");
    }

    // Step 4: Services
    let store = toml_config.storage.build_store(initializer.root_folder())?;
    let registry = Arc::new(ConverterRegistry::with_builtin());
    let event_bus = EventBus::new(100);
    let pipeline = ImportPipeline::new(
        db_pool.clone(),
        event_bus.clone(),
        registry,
        store,
        settings.pipeline_config(),
    );

    let state = AppState::new(db_pool, event_bus, pipeline);
    let mut app = dlab_ci::build_router(state);
    if toml_config.storage.backend == StorageBackend::Local {
        let asset_root = toml_config.storage.local_root(initializer.root_folder());
        info!("Serving local assets from {}", asset_root.display());
        app = app.nest_service("/assets", ServeDir::new(asset_root));
    }

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", args.bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", args.bind, port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("dlab-ci stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
