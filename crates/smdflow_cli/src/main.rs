//! smdflow CLI
//!
//! Command-line tools for reading smd channels and running workers.
//!
//! # Commands
//!
//! - `run` - Run workers and a collector over a data source
//! - `inspect` - Display channel and event statistics for smd files
//! - `dump` - Print the events built from smd files

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// smdflow command-line tools.
#[derive(Parser)]
#[command(name = "smdflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workers and a collector, printing upstream messages
    Run {
        /// Data source (static://config.json)
        source: String,

        /// Number of worker threads
        #[arg(short, long, default_value = "1")]
        num_workers: usize,

        /// Stop each worker after this many events
        #[arg(short, long)]
        max_events: Option<u64>,

        /// Graph specification (JSON)
        #[arg(short, long)]
        graph: Option<PathBuf>,

        /// Capacity of the collector queue, in messages
        #[arg(long, default_value = "1024")]
        queue_capacity: usize,

        /// Read graph updates from stdin, one JSON specification per line
        #[arg(long)]
        graph_updates: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Display channel and event statistics for smd files
    Inspect {
        /// One file per channel
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the events built from smd files
    Dump {
        /// One file per channel
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Maximum number of events to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            source,
            num_workers,
            max_events,
            graph,
            queue_capacity,
            graph_updates,
            format,
        } => {
            let options = commands::run::RunOptions {
                num_workers,
                max_events,
                graph,
                queue_capacity,
                graph_updates,
                format,
            };
            commands::run::run(&source, &options)?;
        }
        Commands::Inspect { files, format } => {
            commands::inspect::run(&files, format)?;
        }
        Commands::Dump {
            files,
            limit,
            format,
        } => {
            commands::dump::run(&files, limit, format)?;
        }
        Commands::Version => {
            println!("smdflow CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
