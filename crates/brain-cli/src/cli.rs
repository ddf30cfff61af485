//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Brain - on-device expense forecasting from transaction history
#[derive(Parser)]
#[command(name = "brain")]
#[command(about = "Incremental neural core for expense forecasting", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "brain.db", global = true)]
    pub db: PathBuf,

    /// Config file (defaults to the data dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set BRAIN_DB_KEY environment variable with your passphrase.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the brain snapshot (no-op if one exists)
    Init,

    /// Show the state of both prediction heads
    Status,

    /// Learn from a transaction history and print predictions
    Evolve {
        /// Transactions file (CSV, or JSON with a .json extension)
        #[arg(short, long)]
        transactions: PathBuf,

        /// Categories file (CSV, or JSON with a .json extension)
        #[arg(short, long)]
        categories: PathBuf,

        /// Month to predict from (YYYY-MM); defaults to the latest month
        #[arg(short, long)]
        period: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the monthly signals derived from a history
    Months {
        /// Transactions file
        #[arg(short, long)]
        transactions: PathBuf,

        /// Categories file
        #[arg(short, long)]
        categories: PathBuf,
    },

    /// List recorded evolution runs
    History {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Write the snapshot as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete the snapshot
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
