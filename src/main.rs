//! lms-session - learning platform session client
//!
//! Logs in, keeps the access credential renewed, and hands it to scripts.

mod api;
mod auth;
mod config;
mod models;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "lms-session")]
#[command(about = "Session client for the learning platform API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// API base URL (overrides config file)
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "LMS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current credential status
    Status,

    /// Renew the access token now
    Refresh,

    /// Print a fresh access token
    Token,

    /// Show current user info (verify auth works)
    Whoami,

    /// Keep the session renewed until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so `token` output stays pipeable)
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config = config.with_api_base_url(url)?;
    }

    match cli.command {
        Commands::Login { email, password } => {
            tracing::info!("Starting login...");
            auth::login(&config, &email, &password).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(&config).await?;
        }
        Commands::Status => {
            auth::status(&config).await?;
        }
        Commands::Refresh => {
            auth::refresh(&config).await?;
        }
        Commands::Token => {
            auth::token(&config).await?;
        }
        Commands::Whoami => {
            api::whoami(&config).await?;
        }
        Commands::Watch => {
            auth::watch(&config).await?;
        }
    }

    Ok(())
}
