use clap::Subcommand;
use serde_json::Value;

use crate::cli::utils::{http_client, output_record, output_records, output_success, parse_filters, read_stdin_object};
use crate::cli::OutputFormat;
use crate::client::{FormController, RecordClient};
use crate::resources::ResourceKind;

#[derive(Subcommand)]
pub enum RecordCommands {
    #[command(about = "List records")]
    List {
        #[arg(long = "where", help = "Equality filter as key=value (repeatable)")]
        filters: Vec<String>,
        #[arg(long, help = "Maximum number of records")]
        limit: Option<u32>,
        #[arg(long, help = "Order, e.g. 'apellidos asc'")]
        order: Option<String>,
    },

    #[command(about = "Show one record")]
    Get {
        #[arg(help = "Record ID")]
        id: String,
    },

    #[command(about = "Create a record from a JSON object on stdin")]
    Create {
        #[arg(long, help = "Pre-fill from this youth (attentions only)")]
        joven: Option<String>,
    },

    #[command(about = "Update a record with the JSON fields on stdin")]
    Update {
        #[arg(help = "Record ID to update")]
        id: String,
    },

    #[command(about = "Delete a record")]
    Delete {
        #[arg(help = "Record ID to delete")]
        id: String,
    },
}

fn list_columns(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Joven => &["id", "nombres", "apellidos", "edad", "estado"],
        ResourceKind::Atencion => &["id", "fecha_atencion", "tipo_atencion", "estado", "motivo"],
        _ => &["id"],
    }
}

pub async fn handle(kind: ResourceKind, cmd: RecordCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = http_client()?;

    match cmd {
        RecordCommands::List { filters, limit, order } => {
            let mut params = parse_filters(&filters)?;
            if let Some(limit) = limit {
                params.push(("limit".to_string(), limit.to_string()));
            }
            if let Some(order) = order {
                params.push(("order".to_string(), order));
            }
            let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let rows = client.load_list_with_fallback(kind, &params).await?;
            output_records(&output_format, &rows, list_columns(kind), &format!("No {} found", kind.def().plural))
        }
        RecordCommands::Get { id } => {
            let row = client.fetch(kind, &id).await?;
            output_record(&output_format, &row)
        }
        RecordCommands::Create { joven } => {
            let input = read_stdin_object()?;
            let mut form = FormController::new(client, kind);
            if let Some(joven_id) = joven {
                form.prefill_from_joven(&joven_id).await?;
            }
            fill(&mut form, input);
            let row = submit(&mut form).await?;
            let id = row.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            output_success(&output_format, &format!("Created {} {}", kind, id), Some(Value::Object(row)))
        }
        RecordCommands::Update { id } => {
            let input = read_stdin_object()?;
            let mut form = FormController::new(client, kind);
            form.load_existing(&id).await?;
            fill(&mut form, input);
            let row = submit(&mut form).await?;
            output_success(&output_format, &format!("Updated {} {}", kind, id), Some(Value::Object(row)))
        }
        RecordCommands::Delete { id } => {
            let rows = client.delete(kind, &id).await?;
            output_success(&output_format, &format!("Deleted {} {}", kind, id), Some(Value::from(rows)))
        }
    }
}

fn fill<C: RecordClient>(form: &mut FormController<C>, input: serde_json::Map<String, Value>) {
    for (name, value) in input {
        form.set_field(&name, value);
    }
}

/// Submit and fold field errors into the reported message
async fn submit<C: RecordClient>(form: &mut FormController<C>) -> anyhow::Result<serde_json::Map<String, Value>> {
    match form.submit().await {
        Ok(row) => Ok(row),
        Err(err) => {
            let fields: Vec<String> = err
                .field_errors()
                .iter()
                .map(|(field, msg)| format!("  {}: {}", field, msg))
                .collect();
            if fields.is_empty() {
                Err(err.into())
            } else {
                Err(anyhow::anyhow!("{}\n{}", err, fields.join("\n")))
            }
        }
    }
}

