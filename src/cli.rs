use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hotel-rates-cli")]
#[command(about = "Collects daily hotel-rate snapshots from a metered pricing API and derives competitive statistics")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the JSON configuration file (defaults to config.json, builtin
    /// settings when that file is absent)
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch snapshots for the configured date window
    Collect {
        /// Follow pagination per date instead of fetching only page 0
        #[arg(long)]
        full: bool,

        /// Dates fetched concurrently per batch (1 = strictly sequential)
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Politeness delay between calls or batches, in milliseconds
        #[arg(long, default_value_t = 250)]
        delay_ms: u64,

        /// Keep issuing calls for later dates even after a quota refusal
        #[arg(long)]
        no_stop_on_limit: bool,
    },

    /// Show the provider account's credit usage
    Status,

    /// Show market statistics for one cached date (e.g. 2026-06-15)
    Stats { date: String },

    /// Show the own property's market rank for one cached date
    Rank { date: String },

    /// Compare prices between two cached dates
    Changes { from: String, to: String },

    /// Scan recent dates for large day-over-day price moves
    Alerts {
        /// How many of the most recent cached dates to scan
        #[arg(long, default_value_t = 14)]
        window: usize,
    },

    /// List cached dates whose average price marks unusual demand
    Demand,

    /// List every date with cached data
    Dates,

    /// Export all cached quotes to a CSV file
    Export { file: String },

    /// Drop every cached snapshot
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
