//! batchsync CLI
//!
//! Replays record uploads against the in-process reference server.
//!
//! # Commands
//!
//! - `upload` - Run one upload session and report what was posted
//! - `limits` - Parse an `info/configuration` document
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::upload::{OutputFormat, RecordSource, UploadOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Batched record upload tools.
#[derive(Parser)]
#[command(name = "batchsync")]
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
    /// Upload records to the in-process reference server
    Upload {
        /// Newline-delimited JSON records, one object with an "id" per line
        #[arg(short, long, conflicts_with = "generate")]
        input: Option<PathBuf>,

        /// Generate this many records instead of reading them
        #[arg(short, long)]
        generate: Option<usize>,

        /// Serialized size of each generated record
        #[arg(long, default_value = "64")]
        record_size: usize,

        /// Collection to upload to
        #[arg(short, long, default_value = "bookmarks")]
        collection: String,

        /// Maximum number of records per POST
        #[arg(long)]
        max_post_records: Option<u64>,

        /// Maximum number of bytes per POST
        #[arg(long)]
        max_post_bytes: Option<u64>,

        /// Maximum number of records per batch
        #[arg(long)]
        max_total_records: Option<u64>,

        /// Maximum number of bytes per batch
        #[arg(long)]
        max_total_bytes: Option<u64>,

        /// Make the server apply every POST immediately
        #[arg(long)]
        no_batching: bool,

        /// Record ids the server refuses to store
        #[arg(long)]
        reject: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Parse an info/configuration document (or show the defaults)
    Limits {
        /// JSON document to parse
        #[arg(short, long)]
        file: Option<PathBuf>,
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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Upload {
            input,
            generate,
            record_size,
            collection,
            max_post_records,
            max_post_bytes,
            max_total_records,
            max_total_bytes,
            no_batching,
            reject,
            format,
        } => {
            let source = match (input, generate) {
                (Some(path), _) => RecordSource::File(path),
                (None, Some(count)) => RecordSource::Generated { count, record_size },
                (None, None) => return Err("either --input or --generate is required".into()),
            };
            let mut limits = batchsync_protocol::ServerLimits::default();
            if let Some(records) = max_post_records {
                limits = limits.with_max_post_records(records);
            }
            if let Some(bytes) = max_post_bytes {
                limits = limits.with_max_post_bytes(bytes);
            }
            if let Some(records) = max_total_records {
                limits = limits.with_max_total_records(records);
            }
            if let Some(bytes) = max_total_bytes {
                limits = limits.with_max_total_bytes(bytes);
            }

            let options = UploadOptions {
                source,
                collection,
                limits,
                batching: !no_batching,
                reject,
                format: OutputFormat::parse(&format)?,
            };
            commands::upload::run(&options)?;
        }
        Commands::Limits { file } => {
            commands::limits::run(file.as_deref())?;
        }
        Commands::Version => {
            println!("batchsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
