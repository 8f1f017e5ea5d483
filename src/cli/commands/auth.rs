use crate::cli::utils::{http_client, output_success};
use crate::cli::OutputFormat;

/// Show the identity the server resolves for the configured session
pub async fn whoami(output_format: OutputFormat) -> anyhow::Result<()> {
    let identity = http_client()?.whoami().await?;
    let label = format!(
        "{} <{}> ({})",
        identity["nombre_completo"].as_str().unwrap_or("-"),
        identity["email"].as_str().unwrap_or("-"),
        identity["role"].as_str().unwrap_or("-"),
    );
    output_success(&output_format, &label, Some(identity))
}
