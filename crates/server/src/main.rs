use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use magpie_core::catalog::{ProductCatalog, Reconciler, SqliteCatalog};
use magpie_core::credentials::{CredentialStore, SqliteCredentialStore};
use magpie_core::runlog::{create_run_log_system, RunLogStore, SqliteRunLogStore};
use magpie_core::schedule::{default_jobs, Scheduler};
use magpie_core::scraper::{AbledataScraper, GithubScraper, RavelryScraper, ThingiverseScraper};
use magpie_core::terms::{SqliteTermStore, TermStore};
use magpie_core::{load_config, validate_config, ScraperRegistry, TriggerService};

use magpie_server::api::create_router;
use magpie_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the run log channel
const RUN_LOG_BUFFER_SIZE: usize = 256;

/// Actor recorded for scheduler-initiated runs
const SCHEDULER_ACTOR: &str = "scheduler";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("MAGPIE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for startup logging
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Starting magpie"
    );

    // Create SQLite stores
    let catalog: Arc<dyn ProductCatalog> = Arc::new(
        SqliteCatalog::new(&config.database.path).context("Failed to create product catalog")?,
    );
    info!("Product catalog initialized");

    let credential_store: Arc<dyn CredentialStore> = Arc::new(
        SqliteCredentialStore::new(&config.database.path)
            .context("Failed to create credential store")?,
    );
    info!("Credential store initialized");

    let term_store: Arc<dyn TermStore> = Arc::new(
        SqliteTermStore::new(&config.database.path).context("Failed to create term store")?,
    );
    info!("Term store initialized");

    let run_log_store: Arc<dyn RunLogStore> = Arc::new(
        SqliteRunLogStore::new(&config.database.path).context("Failed to create run log store")?,
    );
    info!("Run log store initialized");

    // Create run log system
    let (run_log_handle, run_log_writer) = create_run_log_system(
        Arc::clone(&run_log_store),
        config.runlog.system_actor.clone(),
        RUN_LOG_BUFFER_SIZE,
    );

    // Spawn run log writer task
    let writer_handle = tokio::spawn(run_log_writer.run());

    // Create the reconciler and register source adapters
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&catalog)));

    let mut registry = ScraperRegistry::new();
    registry.register(Arc::new(GithubScraper::new(
        config.scrapers.github.clone(),
        Arc::clone(&reconciler),
        Arc::clone(&term_store),
    )));
    registry.register(Arc::new(RavelryScraper::new(
        config.scrapers.ravelry.clone(),
        Arc::clone(&reconciler),
        Arc::clone(&term_store),
        Arc::clone(&credential_store),
    )));
    registry.register(Arc::new(ThingiverseScraper::new(
        config.scrapers.thingiverse.clone(),
        Arc::clone(&reconciler),
        Arc::clone(&term_store),
        Arc::clone(&credential_store),
    )));
    registry.register(Arc::new(AbledataScraper::new(
        config.scrapers.abledata.clone(),
        Arc::clone(&reconciler),
        Arc::clone(&term_store),
    )));
    let registry = Arc::new(registry);
    info!(sources = registry.len(), "Source adapters registered");

    // Create trigger service
    let trigger = Arc::new(TriggerService::new(
        Arc::clone(&registry),
        Arc::clone(&catalog),
        run_log_handle.clone(),
    ));

    // Create scheduler if enabled
    let scheduler = if config.scheduler.enabled {
        let scheduler = Scheduler::new(
            default_jobs(),
            Arc::clone(&trigger),
            Arc::clone(&credential_store),
            SCHEDULER_ACTOR,
        );
        scheduler.start();
        Some(scheduler)
    } else {
        info!("Scheduler disabled in config");
        None
    };

    // Create app state
    let app_state = Arc::new(AppState::new(
        config.clone(),
        trigger,
        registry,
        run_log_store,
        term_store,
        credential_store,
    ));

    // Create router
    let app = create_router(app_state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // Stop the scheduler; ticks already fired keep their run log handles
    // until they finish.
    if let Some(ref scheduler) = scheduler {
        scheduler.stop();
        info!("Scheduler stopped");
    }

    // Drop all holders of RunLogHandle so the writer's channel closes.
    // The scheduler holds the trigger service, which holds a handle clone;
    // the AppState was moved into the router which is already dropped.
    drop(scheduler);
    drop(run_log_handle);

    // Wait for the writer to finish processing remaining entries
    let _ = writer_handle.await;
    info!("Run log writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
