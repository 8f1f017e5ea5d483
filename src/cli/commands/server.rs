use crate::{config, server};

/// Run the API server in the foreground
pub async fn handle(memory: bool) -> anyhow::Result<()> {
    let config = config::config().clone();
    let state = server::build_state(config, memory).await?;
    server::serve(state).await
}
