use anyhow::{Context, Result};
use axum::Router;
use image_resizer::{
    config::{AppConfig, RunMode},
    routes,
    services::{
        notifier::LogNotifier,
        object_store::ObjectStore,
        storage_service::{StorageService, run_migrations},
        worker_service::ResizeWorker,
    },
    state::AppState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, process::ExitCode, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-resizer with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database URL `{}`", cfg.database_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    run_migrations(&db).await?;
    if mode == RunMode::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(ExitCode::SUCCESS);
    }

    // --- Initialize services ---
    let storage = StorageService::new(db.clone(), cfg.storage_dir.clone());
    storage.ensure_container(&cfg.raw_container).await?;

    let store: Arc<dyn ObjectStore> = Arc::new(storage.clone());
    let worker = ResizeWorker::new(store.clone(), Arc::new(LogNotifier), cfg.raw_container.clone());

    if let RunMode::Once { input, name } = mode {
        let payload = tokio::fs::read(&input)
            .await
            .with_context(|| format!("reading {}", input.display()))?;
        // stage the source where the worker expects it, as an upload would
        store
            .upload(&cfg.raw_container, &name, payload.into(), "application/octet-stream")
            .await?;
        return Ok(match worker.handle_stored(name).await {
            Ok(done) => {
                for key in &done.derivatives {
                    println!("{key}");
                }
                ExitCode::SUCCESS
            }
            Err(_) => ExitCode::FAILURE,
        });
    }

    let state = AppState {
        storage,
        worker,
        raw_container: cfg.raw_container.clone(),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(ExitCode::SUCCESS)
}
