//! eBay seller dashboard
//!
//! Keeps a seller's eBay connection alive and shows their active listings
//! in the terminal.

mod api;
mod auth;
mod config;
mod dashboard;
mod session;
#[cfg(test)]
mod testing;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[derive(Parser)]
#[command(name = "ebay-dashboard")]
#[command(about = "eBay seller dashboard for the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in as a seller of the dashboard backend
    Login {
        /// Backend user id
        #[arg(short, long)]
        user_id: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },

    /// Sign out and clear every stored credential
    Logout,

    /// Show the signed-in seller and eBay connection state
    Status,

    /// Connect the seller's eBay account
    Connect,

    /// Print a page of active listings
    Listings {
        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: u32,
    },

    /// Update the saved configuration
    Configure {
        /// Backend base URL
        #[arg(long)]
        backend: Option<String>,

        /// Origin of the authorization callback page
        #[arg(long)]
        origin: Option<String>,

        /// Listings per page
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Launch the terminal dashboard
    Tui,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // The TUI owns the screen, so its logs go to the status bar instead.
    let tui_logs = matches!(cli.command, Commands::Tui).then(tui::LogBuffer::new);
    let (stderr_layer, buffer_layer) = match &tui_logs {
        Some(logs) => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(logs.clone()),
            ),
        ),
        None => (Some(tracing_subscriber::fmt::layer().with_target(false)), None),
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(buffer_layer)
        .init();

    match cli.command {
        Commands::Login {
            user_id,
            email,
            name,
        } => {
            let session = dashboard::open_session()?;
            auth::login(
                &session,
                auth::User {
                    id: user_id,
                    email,
                    name,
                },
            )?;
            println!("Signed in. Run 'ebay-dashboard connect' to link your eBay account.");
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(&dashboard::open_session()?)?;
        }
        Commands::Status => {
            auth::status(&dashboard::open_session()?)?;
        }
        Commands::Connect => {
            let config = Config::load()?;
            dashboard::connect(&config).await?;
        }
        Commands::Listings { page } => {
            let config = Config::load()?;
            dashboard::listings(&config, page).await?;
        }
        Commands::Configure {
            backend,
            origin,
            page_size,
        } => {
            let mut config = Config::load()?;
            if let Some(backend) = backend {
                config.backend_base = backend;
            }
            if let Some(origin) = origin {
                config.app_origin = origin;
            }
            if let Some(page_size) = page_size {
                config.page_size = page_size;
            }
            config.save()?;
            println!("Configuration saved.");
        }
        Commands::Tui => {
            let config = Config::load()?;
            tui::run(&config, tui_logs.unwrap_or_default()).await?;
        }
    }

    Ok(())
}
