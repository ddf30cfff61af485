//! Brain CLI - incremental expense forecasting
//!
//! Usage:
//!   brain init                                       Create the brain snapshot
//!   brain evolve -t transactions.csv -c categories.csv
//!   brain status                                     Show head statistics
//!   brain history                                    List evolution runs

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            let (_, brain) = commands::open_brain(&cli.db, cli.no_encrypt, &config)?;
            commands::cmd_init(&brain, &cli.db, cli.no_encrypt)
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt, &config),
        Commands::Evolve {
            transactions,
            categories,
            period,
            json,
        } => {
            let (db, brain) = commands::open_brain(&cli.db, cli.no_encrypt, &config)?;
            commands::cmd_evolve(
                &brain,
                &db,
                &transactions,
                &categories,
                period.as_deref(),
                json,
            )
            .await
            .map(|_| ())
        }
        Commands::Months {
            transactions,
            categories,
        } => commands::cmd_months(&transactions, &categories),
        Commands::History { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_history(&db, limit)
        }
        Commands::Export { output } => {
            let (_, brain) = commands::open_brain(&cli.db, cli.no_encrypt, &config)?;
            commands::cmd_export(&brain, output.as_deref())
        }
        Commands::Reset { yes } => {
            let (_, brain) = commands::open_brain(&cli.db, cli.no_encrypt, &config)?;
            commands::cmd_reset(&brain, yes)
        }
    }
}
