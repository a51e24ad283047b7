//! `jamd`: the companies and collections API server.
//!
//! Usage:
//!   jamd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/jam/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use jam_core::Module;
use tracing::{error, info};

use config::ServerConfig;

/// Companies and collections server.
#[derive(Parser, Debug)]
#[command(name = "jamd", about = "Companies and collections API server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8000")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load server configuration.
    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    // Initialize storage.
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = jam_core::ServiceConfig {
        data_dir: Some(data_dir),
        listen: cli.listen.clone(),
        ..Default::default()
    };

    let sql: Arc<dyn jam_sql::SQLStore> = Arc::new(
        jam_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let store = Arc::new(
        collections::CollectionStore::new(sql)
            .map_err(|e| anyhow::anyhow!("failed to initialise collections schema: {}", e))?,
    );

    if server_config.seed.enabled {
        let seed_store = Arc::clone(&store);
        let companies = server_config.seed.companies;
        let seeded = tokio::task::spawn_blocking(move || {
            collections::seed::seed(&seed_store, companies)
        })
        .await?
        .map_err(|e| anyhow::anyhow!("seeding failed: {}", e))?;
        if !seeded {
            info!("Database already seeded");
        }
    }

    // Initialize modules.
    let task_module = task::TaskModule::with_config(task::WorkerConfig {
        max_concurrent: server_config.worker.max_concurrent,
    });
    info!("Task module initialized");

    let collections_module = collections::CollectionsModule::new(
        store,
        Arc::clone(task_module.pool()),
        collections::BulkConfig {
            delete_delay: server_config.worker.delete_delay(),
        },
    );
    info!("Collections module initialized");

    let module_routes = vec![
        (task_module.name(), task_module.routes()),
        (collections_module.name(), collections_module.routes()),
    ];

    let cors = routes::cors_layer(&server_config.http.cors_origins)?;
    let app = routes::build_router(module_routes, cors);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("jamd listening on {}", core_config.listen);
    let pool = Arc::clone(task_module.pool());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&pool)))
        .await?;

    // Running bulk tasks finish before the process exits.
    pool.drain().await;
    info!("jamd stopped");

    Ok(())
}

/// Resolves on Ctrl-C. Queued bulk tasks are failed right away so pollers
/// still connected see it.
async fn shutdown_signal(pool: Arc<task::WorkerPool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    pool.shutdown();
}
