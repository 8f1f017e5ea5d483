use inami_api::{config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SESSION_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = config::config().clone();
    server::init_tracing(config.api.json_logs);

    let memory = std::env::var("INAMI_MEMORY_STORE").map(|v| v == "1" || v == "true").unwrap_or(false);
    let state = server::build_state(config, memory).await?;
    server::serve(state).await
}
