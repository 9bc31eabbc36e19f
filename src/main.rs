//! # Dump Harness CLI (`dump`)
//!
//! The `dump` binary runs the pipeline stages one at a time. Each stage reads
//! what the previous one left on disk, so a stage can be re-run on its own.
//!
//! ## Usage
//!
//! ```bash
//! dump [--config ./dump.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dump prepare` | Copy inputs into working dirs, chunk them and write `_info.json` |
//! | `dump chunkify` | Only split inputs into line-aligned chunks |
//! | `dump extract` | Scan prepared dirs for fragments into `_metadata.json` |
//! | `dump optimize` | De-duplicate records into `_metadata.opti.json` |
//! | `dump populate` | Push records into the configured sink |
//!
//! ## Examples
//!
//! ```bash
//! # Prepare every file under ./dumps, recursively
//! dump prepare -d ./dumps -r -o ./work --bucket combo
//!
//! # Extract only emails and IPs, redoing finished directories
//! dump extract -d ./work -m email -m ip --overwrite
//!
//! # Send optimized records to a local JSON lines file
//! dump populate -d ./work --sink jsonl --sink-path ./out/docs.jsonl
//! ```

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use dump_harness::chunkify_cmd::{self, ChunkifyOptions};
use dump_harness::config::{self, Config};
use dump_harness::discovery::InputSelection;
use dump_harness::extract_cmd::{self, ExtractOptions};
use dump_harness::optimize::{self, OptimizeOptions};
use dump_harness::pool::PoolSettings;
use dump_harness::populate::{self, PopulateOptions, RecordSource};
use dump_harness::prepare::{self, PrepareOptions};
use dump_harness::progress::ProgressMode;
use dump_harness::sink;

/// Dump Harness CLI: chunk, describe, extract and index leak corpora.
///
/// All commands accept an optional `--config` flag pointing to a TOML
/// configuration file. Flags given on the command line win over it.
#[derive(Parser)]
#[command(
    name = "dump",
    about = "Dump Harness: chunk, describe, extract and index leak and dump corpora",
    version,
    long_about = "Dump Harness copies raw dump files into working directories, splits oversized \
    text files into line-aligned chunks, describes nested archives as a metadata tree, extracts \
    emails, IPs, domains and phone numbers, de-duplicates them and pushes them to a batch sink."
)]
struct Cli {
    /// Path to a configuration file (TOML). Built-in defaults apply without one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress on stderr: auto, human, json or off.
    #[arg(long, global = true, default_value = "auto")]
    progress: ProgressMode,

    /// Log level (off, error, warn, info, debug, trace). `RUST_LOG` wins.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Where a stage reads from and how wide it runs.
#[derive(Args, Clone)]
struct InputArgs {
    /// Input path (repeatable).
    #[arg(short = 'i', long = "input")]
    inputs: Vec<PathBuf>,

    /// Directory to search for inputs (repeatable).
    #[arg(short = 'd', long = "directory")]
    directories: Vec<PathBuf>,

    /// Search directories recursively.
    #[arg(short, long)]
    recursive: bool,

    /// Worker slots. Defaults to `[pool].threads`, then one per CPU.
    #[arg(short = 't', long)]
    threads: Option<usize>,
}

impl InputArgs {
    fn selection(&self, exclude_globs: &[String]) -> anyhow::Result<InputSelection> {
        let selection = InputSelection {
            inputs: self.inputs.clone(),
            directories: self.directories.clone(),
            recursive: self.recursive,
            exclude_globs: exclude_globs.to_vec(),
        };
        if selection.is_empty() {
            bail!("No inputs given: pass --input and/or --directory");
        }
        Ok(selection)
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Prepare inputs for extraction.
    ///
    /// Copies every input into `<output>/<uuid>/data/`, splits oversized text
    /// files into chunks, describes nested `.compressed` archives and writes
    /// the metadata tree to `<output>/<uuid>/_info.json`.
    Prepare {
        #[command(flatten)]
        input: InputArgs,

        /// Output root for the prepared directories.
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Date tag stored on every node (defaults to today, YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Classification tag stored on every node.
        #[arg(long)]
        bucket: Option<String>,

        /// Files larger than this many bytes are chunked.
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Pack each prepared `data/` into `data.compressed`.
        #[arg(long)]
        compress: bool,
    },

    /// Split inputs into line-aligned chunks without building a tree.
    Chunkify {
        #[command(flatten)]
        input: InputArgs,

        /// Output root; each input gets its own `<uuid>/` directory.
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Maximum chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Name recorded in `_chunks.json` (defaults to the input file name).
        #[arg(long)]
        name: Option<String>,

        /// Description recorded in `_chunks.json`.
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Extract fragments from prepared directories.
    ///
    /// Inputs are prepared directories, or roots searched for them.
    Extract {
        #[command(flatten)]
        input: InputArgs,

        /// Redo directories that already have `_metadata.json`.
        #[arg(short = 'f', long)]
        overwrite: bool,

        /// Extraction module (email, ip, domain, phonenumber). Repeatable;
        /// defaults to `[extract].modules`.
        #[arg(short = 'm', long = "module")]
        modules: Vec<String>,
    },

    /// De-duplicate extracted records.
    Optimize {
        #[command(flatten)]
        input: InputArgs,

        /// Redo directories that already have `_metadata.opti.json`.
        #[arg(short = 'f', long)]
        overwrite: bool,
    },

    /// Push extracted records into a batch sink.
    Populate {
        #[command(flatten)]
        input: InputArgs,

        /// Records to send: `opti` or `raw`. Falls back to the other file.
        #[arg(long, default_value = "opti")]
        prefer: RecordSource,

        /// Sink kind: `http` or `jsonl`.
        #[arg(long)]
        sink: Option<String>,

        /// Base URL of the HTTP sink.
        #[arg(long)]
        url: Option<String>,

        /// Collection name of the HTTP sink.
        #[arg(long)]
        collection: Option<String>,

        /// Output file of the jsonl sink.
        #[arg(long)]
        sink_path: Option<PathBuf>,

        /// Documents per batch.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn pool_settings(cfg: &Config, threads: Option<usize>, progress: ProgressMode) -> PoolSettings {
    let mut settings = PoolSettings::new(threads.unwrap_or_else(|| cfg.pool.threads()));
    settings.task_timeout = cfg.pool.task_timeout();
    settings.progress = Some(Arc::from(progress.reporter()));

    let cancel = settings.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; waiting for running items to stop");
            cancel.cancel();
        }
    });
    settings
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(level) = &cli.log_level {
        cfg.logging.level = level.clone();
    }
    init_logging(&cfg.logging.level);

    match cli.command {
        Commands::Prepare {
            input,
            output,
            date,
            bucket,
            chunk_size,
            compress,
        } => {
            if let Some(chunk_size) = chunk_size {
                cfg.prepare.chunk_size = chunk_size;
            }
            if compress {
                cfg.prepare.compress_output = true;
            }
            cfg.validate()?;

            let date = date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let selection = input.selection(&cfg.prepare.exclude_globs)?;
            let options = PrepareOptions::from_config(&cfg, selection, output, date, bucket);
            let settings = pool_settings(&cfg, input.threads, cli.progress);
            prepare::run_prepare(&options, &settings).await?.print();
        }
        Commands::Chunkify {
            input,
            output,
            chunk_size,
            name,
            description,
        } => {
            if let Some(chunk_size) = chunk_size {
                cfg.prepare.chunk_size = chunk_size;
            }
            cfg.validate()?;

            let options = ChunkifyOptions {
                selection: input.selection(&cfg.prepare.exclude_globs)?,
                output,
                chunk_size: cfg.prepare.chunk_size,
                name,
                description,
            };
            let settings = pool_settings(&cfg, input.threads, cli.progress);
            chunkify_cmd::run_chunkify(&options, &settings).await?.print();
        }
        Commands::Extract {
            input,
            overwrite,
            modules,
        } => {
            if !modules.is_empty() {
                cfg.extract.modules = modules;
            }
            cfg.validate()?;

            let options = ExtractOptions {
                selection: input.selection(&[])?,
                overwrite,
                modules: cfg.extract.modules.clone(),
                compression_level: cfg.prepare.compression_level,
            };
            let settings = pool_settings(&cfg, input.threads, cli.progress);
            extract_cmd::run_extract(&options, &settings).await?.print();
        }
        Commands::Optimize { input, overwrite } => {
            cfg.validate()?;

            let options = OptimizeOptions {
                selection: input.selection(&[])?,
                overwrite,
            };
            let settings = pool_settings(&cfg, input.threads, cli.progress);
            optimize::run_optimize(&options, &settings).await?.print();
        }
        Commands::Populate {
            input,
            prefer,
            sink: kind,
            url,
            collection,
            sink_path,
            batch_size,
        } => {
            if let Some(kind) = kind {
                cfg.sink.kind = kind;
            }
            if let Some(url) = url {
                cfg.sink.url = url;
            }
            if let Some(collection) = collection {
                cfg.sink.collection = collection;
            }
            if let Some(path) = sink_path {
                cfg.sink.path = Some(path);
            }
            if let Some(batch_size) = batch_size {
                cfg.sink.batch_size = batch_size;
            }
            cfg.validate()?;

            let options = PopulateOptions {
                selection: input.selection(&[])?,
                source: prefer,
                batch_size: cfg.sink.batch_size,
            };
            let target: Arc<dyn sink::BatchSink> = Arc::from(sink::create_sink(&cfg.sink)?);
            let settings = pool_settings(&cfg, input.threads, cli.progress);
            populate::run_populate(&options, target, &settings)
                .await?
                .print();
        }
    }

    Ok(())
}
