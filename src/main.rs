//! File Store Cache - operator command line
//!
//! Reads and changes a shared cache file from the shell. Options come from
//! the `FILE_STORE_CACHE_*` environment variables; `--dir` and `--name`
//! override the file location.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_store_cache::{CacheOptions, DistributedCache, EntryOptions};

#[derive(Debug, Parser)]
#[command(name = "file_store_cache", version, about = "Inspect and edit a shared file store cache")]
struct Cli {
    /// Directory holding the cache file
    #[arg(long, env = "FILE_STORE_CACHE_DIR")]
    dir: Option<PathBuf>,

    /// Second part of the cache file name
    #[arg(long, env = "FILE_STORE_CACHE_NAME")]
    name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the value stored under a key
    Get { key: String },
    /// Store a value
    Set {
        key: String,
        value: String,
        /// Extra payload (extras and class variants only)
        #[arg(long)]
        extra: Option<String>,
        /// Expire the entry after this many seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Delete a key
    Remove { key: String },
    /// Empty the whole cache
    Clear,
    /// Print all live key/value pairs as JSON
    List,
    /// Print the raw cache file
    Dump,
}

fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_store_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut options = CacheOptions::from_env().context("Failed to load cache options")?;
    if let Some(dir) = cli.dir {
        options.path_to_cache_file_directory = dir;
    }
    if let Some(name) = cli.name {
        options.second_part_of_cache_file_name = name;
    }
    info!(
        "Configuration loaded: file={}, max_bytes={}, variant={:?}",
        options.cache_file_path().display(),
        options.max_bytes_in_json_cache_file,
        options.which_variant
    );

    let cache = DistributedCache::from_options(&options).context("Failed to open cache")?;
    let strings = cache.as_string_cache();

    match cli.command {
        Command::Get { key } => match strings.get(&key)? {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("key '{}' not found", key);
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Set {
            key,
            value,
            extra,
            ttl_secs,
        } => {
            let entry_options = EntryOptions::from(ttl_secs.map(Duration::from_secs));
            match (extra, cache.as_extras_cache()) {
                (None, _) => strings.set(&key, &value, &entry_options)?,
                (Some(extra), Some(extras)) => {
                    extras.set_with_extra(&key, &value, Some(extra.as_str()), &entry_options)?
                }
                (Some(_), None) => bail!(
                    "--extra needs the StringWithExtras or Class variant (set FILE_STORE_CACHE_VARIANT)"
                ),
            }
        }
        Command::Remove { key } => strings.remove(&key)?,
        Command::Clear => strings.clear_all()?,
        Command::List => {
            let values: BTreeMap<_, _> = strings.get_all_key_values()?.into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Command::Dump => println!("{}", strings.cache_file_content()?),
    }

    Ok(ExitCode::SUCCESS)
}
