//! ancientkv CLI
//!
//! Maintenance commands for a node's freezer and key-value store.

use std::io::Read;
use std::path::PathBuf;

use ancientkv::config::DEFAULT_SEGMENT_CAPACITY;
use ancientkv::{
    AncientError, Freezer, FreezerConfig, FreezerTable, KeyRange, KvConfig, KvStore, LogStore,
    TableOptions,
};
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// ancientkv CLI
#[derive(Parser, Debug)]
#[command(name = "ancientkv")]
#[command(about = "Inspect and repair a node's freezer and key-value store")]
#[command(version)]
struct Args {
    /// Database directory
    #[arg(short, long, default_value = "./chaindata")]
    datadir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operate on the append-only freezer
    Freezer {
        /// Maximum segment file size in bytes
        #[arg(long, default_value_t = DEFAULT_SEGMENT_CAPACITY)]
        capacity: u64,

        #[command(subcommand)]
        command: FreezerCommand,
    },

    /// Operate on the generic key-value store
    Kv {
        #[command(subcommand)]
        command: KvCommand,
    },
}

#[derive(Subcommand, Debug)]
enum FreezerCommand {
    /// Append one hex-encoded item to a table and sync it
    Append {
        /// Table name (headers, hashes, bodies, receipts, diffs)
        #[arg(short, long)]
        table: String,

        /// Hex item; read from stdin when omitted
        item: Option<String>,
    },

    /// Open every table (repairing each) and verify equal lengths
    Repair,

    /// Print per-table lengths and sizes
    Inspect,
}

#[derive(Subcommand, Debug)]
enum KvCommand {
    /// Store a hex value under a hex key
    Put {
        key: String,

        /// Hex value; read from stdin when omitted
        value: Option<String>,

        /// Compact the whole store afterwards
        #[arg(long)]
        compact: bool,
    },

    /// Delete a hex key
    Delete {
        key: String,

        /// Compact the whole store afterwards
        #[arg(long)]
        compact: bool,
    },

    /// Compact a key range (hex bounds, start inclusive, limit exclusive)
    Compact {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        limit: Option<String>,
    },
}

/// Errors surfaced by the CLI
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] AncientError),

    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No payload given and stdin was empty")]
    MissingPayload,
}

fn main() {
    // Initialize tracing/logging (stderr, stdout is for command output)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ancientkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Commands::Freezer { capacity, command } => {
            let config = FreezerConfig::builder()
                .data_dir(&args.datadir)
                .segment_capacity(capacity)
                .build();
            run_freezer(config, command)
        }
        Commands::Kv { command } => {
            let config = KvConfig::builder().data_dir(&args.datadir).build();
            run_kv(config, command)
        }
    }
}

fn run_freezer(config: FreezerConfig, command: FreezerCommand) -> Result<(), CliError> {
    match command {
        FreezerCommand::Append { table, item } => {
            let compression = *config
                .tables
                .get(&table)
                .ok_or_else(|| AncientError::UnknownTable(table.clone()))?;
            let item = hex::decode(payload(item)?)?;

            let options = TableOptions::default()
                .compression(compression)
                .segment_capacity(config.segment_capacity);
            let table = FreezerTable::open(&config.data_dir, &table, options)?;

            let mut batch = table.new_batch();
            batch.append_item(&item)?;
            let length = batch.commit()?;
            table.sync()?;
            table.close();

            println!("{} {}", table.name(), length);
        }
        FreezerCommand::Repair => {
            let freezer = Freezer::open(config)?;
            let result = freezer.sync();
            for name in freezer.table_names() {
                let table = freezer.table(name)?;
                if let Some(repair) = table.open_report().repair() {
                    println!("{}: repaired {:?}", name, repair);
                }
            }
            freezer.close();
            result?;
        }
        FreezerCommand::Inspect => {
            let config = FreezerConfig {
                read_only: true,
                ..config
            };
            let freezer = Freezer::open(config)?;
            println!("# {}", freezer.config().data_dir.display());
            for name in freezer.table_names() {
                let table = freezer.table(name)?;
                println!(
                    "{}\titems={}\tbytes={}\tcompressed={}",
                    name,
                    table.len(),
                    table.size()?,
                    table.compression().is_compressed()
                );
            }
            freezer.close();
        }
    }
    Ok(())
}

fn run_kv(config: KvConfig, command: KvCommand) -> Result<(), CliError> {
    let store = LogStore::open(config)?;

    match command {
        KvCommand::Put {
            key,
            value,
            compact,
        } => {
            let key = hex::decode(key)?;
            let value = hex::decode(payload(value)?)?;
            store.put(&key, &value)?;
            if compact {
                store.compact(&KeyRange::all())?;
            }
        }
        KvCommand::Delete { key, compact } => {
            store.delete(&hex::decode(key)?)?;
            if compact {
                store.compact(&KeyRange::all())?;
            }
        }
        KvCommand::Compact { start, limit } => {
            let range = KeyRange::new(
                start.map(hex::decode).transpose()?,
                limit.map(hex::decode).transpose()?,
            );
            let stats = store.compact(&range)?;
            println!(
                "records {} -> {}, bytes {} -> {}",
                stats.records_before, stats.records_after, stats.bytes_before, stats.bytes_after
            );
        }
    }

    store.sync()?;
    Ok(())
}

/// The given argument, or the first whitespace-delimited token on stdin
fn payload(arg: Option<String>) -> Result<String, CliError> {
    if let Some(arg) = arg {
        return Ok(arg);
    }

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    input
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or(CliError::MissingPayload)
}
