use clap::Subcommand;
use serde_json::Value;

use crate::cli::utils::{http_client, output_records, output_success};
use crate::cli::OutputFormat;
use crate::client::RecordClient;
use crate::resources::ResourceKind;

#[derive(Subcommand)]
pub enum NotificationCommands {
    #[command(about = "List notifications")]
    List {
        #[arg(long, help = "Only unread notifications")]
        unread: bool,
    },

    #[command(about = "Mark one notification read")]
    Leer {
        #[arg(help = "Notification ID")]
        id: String,
    },

    #[command(about = "Mark all notifications read")]
    LeerTodas,
}

pub async fn handle(cmd: NotificationCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = http_client()?;

    match cmd {
        NotificationCommands::List { unread } => {
            let params: &[(&str, &str)] = if unread { &[("leida", "false")] } else { &[] };
            let rows = client.list(ResourceKind::Notificacion, params).await?;
            output_records(
                &output_format,
                &rows,
                &["id", "prioridad", "titulo", "leida"],
                "No notifications",
            )
        }
        NotificationCommands::Leer { id } => {
            let row = client.mark_read(&id).await?;
            output_success(&output_format, &format!("Notification {} marked read", id), Some(Value::Object(row)))
        }
        NotificationCommands::LeerTodas => {
            let rows = client.mark_all_read().await?;
            let count = rows.len();
            output_success(
                &output_format,
                &format!("{} notifications marked read", count),
                Some(Value::from(rows)),
            )
        }
    }
}
