use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::database::{DatabaseManager, MemoryStore, PgRecordStore, RecordStore};
use crate::router::app;
use crate::state::AppState;

/// Install the global tracing subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // try_init: a subscriber may already be installed (tests, embedding)
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}

/// Build shared state backed by Postgres, or by the in-memory store
pub async fn build_state(config: AppConfig, memory: bool) -> anyhow::Result<AppState> {
    let store: Arc<dyn RecordStore> = if memory {
        info!("Using in-memory record store");
        Arc::new(MemoryStore::new())
    } else {
        let handles = DatabaseManager::connect(&config).await.context("failed to connect to database")?;
        if config.database.run_migrations {
            DatabaseManager::migrate(&handles).await?;
        }
        Arc::new(PgRecordStore::new(handles, config.database.row_level_role.clone())?)
    };
    Ok(AppState::new(store, config))
}

/// Bind the configured port and serve until Ctrl-C
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind_addr = format!("0.0.0.0:{}", state.config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!(addr = %bind_addr, environment = ?state.config.environment, "INAMI API listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("server error")
}
