//! Supportline CLI, the main entry point.
//!
//! Commands:
//! - `onboard`   Initialize config and a sample FAQ file
//! - `serve`     Start the HTTP gateway
//! - `chat`      Talk to the assistant from the terminal
//! - `faq`       Show how a message scores against the FAQ table
//! - `sessions`  List sessions or print one transcript
//! - `ticket`    Show or update an escalation ticket
//! - `providers` Check the provider chain

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use supportline_core::session::TicketStatus;

mod commands;

#[derive(Parser)]
#[command(
    name = "supportline",
    about = "Supportline: customer support assistant with FAQ answers and human escalation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Use this config file instead of ~/.supportline/config.toml
    #[arg(long, global = true, env = "SUPPORTLINE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and a sample FAQ file
    Onboard,

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Score a message against the FAQ table
    Faq {
        /// The customer message to test
        message: String,
    },

    /// List sessions, or print one transcript
    Sessions {
        /// Print the full transcript of this session
        #[arg(long)]
        id: Option<String>,
    },

    /// Check the provider chain and list available models
    Providers,

    /// Show an escalation ticket, optionally moving it to a new status
    Ticket {
        /// Ticket number
        id: u64,

        /// New status: open, pending or resolved
        #[arg(long, value_parser = parse_status)]
        status: Option<TicketStatus>,
    },
}

fn parse_status(s: &str) -> Result<TicketStatus, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat { message, session } => {
            commands::chat::run(config_path, message, session).await?
        }
        Commands::Faq { message } => commands::faq::run(config_path, &message).await?,
        Commands::Sessions { id } => commands::sessions::run(config_path, id).await?,
        Commands::Providers => commands::providers::run(config_path).await?,
        Commands::Ticket { id, status } => commands::ticket::run(config_path, id, status).await?,
    }

    Ok(())
}
