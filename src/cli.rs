//! CLI argument parsing for the dispatch-engine binary.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dispatch-engine", about = "Freight dispatch scheduling, pricing and run planning")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Route, schedule and price a shipment (JSON in, JSON out)
    Plan {
        /// Shipment JSON file
        #[arg(long)]
        shipment: PathBuf,
        /// Extraction output JSON replacing the shipment's stops
        #[arg(long)]
        extraction: Option<PathBuf>,
        /// Planning clock, e.g. 2025-03-04T09:00:00 (defaults to local now)
        #[arg(long)]
        now: Option<NaiveDateTime>,
    },
    /// Find where a shipment fits into its vehicle's run
    Insert {
        /// Shipment JSON file with an assigned vehicle
        #[arg(long)]
        shipment: PathBuf,
        /// Existing runs as a JSON array
        #[arg(long)]
        runs: Option<PathBuf>,
        /// Planning day (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Commit the best option to the run
        #[arg(long)]
        apply: bool,
    },
    /// Resolve one route leg between two addresses
    Route {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}
