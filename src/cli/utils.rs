use anyhow::Context;
use serde_json::{json, Map, Value};
use std::io::Read;

use crate::cli::OutputFormat;
use crate::client::HttpRecordClient;
use crate::config;

/// Environment variable holding the session token the CLI sends as cookie
pub const SESSION_ENV: &str = "INAMI_SESSION";

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a single record
pub fn output_record(output_format: &OutputFormat, record: &Map<String, Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Text => {
            for (key, value) in record {
                println!("{:<24} {}", key, display_value(value));
            }
        }
    }
    Ok(())
}

/// Output a listing; text mode prints one line per record with the given columns
pub fn output_records(
    output_format: &OutputFormat,
    records: &[Map<String, Value>],
    columns: &[&str],
    empty_message: &str,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Text if records.is_empty() => println!("{}", empty_message),
        OutputFormat::Text => {
            for record in records {
                let line: Vec<String> = columns
                    .iter()
                    .map(|c| record.get(*c).map(display_value).unwrap_or_default())
                    .collect();
                println!("{}", line.join("  "));
            }
        }
    }
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Read a JSON object from stdin
pub fn read_stdin_object() -> anyhow::Result<Map<String, Value>> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input).context("failed to read stdin")?;
    match serde_json::from_str::<Value>(&input).context("stdin is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("expected a JSON object on stdin"),
    }
}

/// Parse `key=value` filter arguments
pub fn parse_filters(filters: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    filters
        .iter()
        .map(|f| {
            f.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| anyhow::anyhow!("filter '{}' must look like key=value", f))
        })
        .collect()
}

/// HTTP client configured from the environment and `INAMI_SESSION`
pub fn http_client() -> anyhow::Result<HttpRecordClient> {
    let config = config::config();
    let token = std::env::var(SESSION_ENV).ok().filter(|t| !t.trim().is_empty());
    if token.is_none() {
        tracing::warn!("{} is not set; requests will be unauthenticated", SESSION_ENV);
    }
    Ok(HttpRecordClient::new(&config.client, &config.session, token)?)
}
