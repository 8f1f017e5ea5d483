pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "inami")]
#[command(about = "INAMI CLI - Command-line interface for the INAMI records API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the API server")]
    Serve {
        #[arg(long, help = "Use the in-memory record store instead of Postgres")]
        memory: bool,
    },

    #[command(about = "Youth records")]
    Jovenes {
        #[command(subcommand)]
        cmd: commands::records::RecordCommands,
    },

    #[command(about = "Attention records")]
    Atenciones {
        #[command(subcommand)]
        cmd: commands::records::RecordCommands,
    },

    #[command(about = "Notifications for the current user")]
    Notificaciones {
        #[command(subcommand)]
        cmd: commands::notifications::NotificationCommands,
    },

    #[command(about = "Show the user behind INAMI_SESSION")]
    Whoami,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    use crate::resources::ResourceKind;

    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { memory } => commands::server::handle(memory).await,
        Commands::Jovenes { cmd } => commands::records::handle(ResourceKind::Joven, cmd, output_format).await,
        Commands::Atenciones { cmd } => commands::records::handle(ResourceKind::Atencion, cmd, output_format).await,
        Commands::Notificaciones { cmd } => commands::notifications::handle(cmd, output_format).await,
        Commands::Whoami => commands::auth::whoami(output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["inami", "jovenes", "list", "--json"]).unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
    }
}
