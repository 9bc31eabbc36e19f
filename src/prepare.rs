//! The `prepare` stage.
//!
//! Every discovered input file gets its own output directory:
//!
//! ```text
//! <output>/<uuid>/
//!     _info.json        metadata tree of the copied input
//!     data/<name>       working copy, chunked and archive-described in place
//! ```
//!
//! With `compress_output` set, `data/` is packed into `data.compressed`
//! once the tree is written. Inputs are processed independently on the
//! task pool; one failing input never stops the others.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::archive::ArchiveCodec;
use crate::config::Config;
use crate::discovery::{discover_files, InputSelection};
use crate::persist::{self, DATA_DIR};
use crate::pool::PoolSettings;
use crate::progress::StageProgressEvent;
use crate::tree::{TreeBuilder, TreeOptions};

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub selection: InputSelection,
    pub output: PathBuf,
    pub tree: TreeOptions,
    pub compress_output: bool,
}

impl PrepareOptions {
    /// Options from the `[prepare]` section, tagged with `date`.
    pub fn from_config(
        config: &Config,
        selection: InputSelection,
        output: PathBuf,
        date: String,
        bucket: Option<String>,
    ) -> Self {
        Self {
            selection,
            output,
            tree: TreeOptions {
                chunk_size: config.prepare.chunk_size,
                chunkable_extensions: config.prepare.chunkable_extensions.clone(),
                date,
                bucket,
                compression_level: config.prepare.compression_level,
            },
            compress_output: config.prepare.compress_output,
        }
    }
}

/// One prepared input.
#[derive(Debug, Clone)]
pub struct PreparedItem {
    pub source: PathBuf,
    pub dir: PathBuf,
    pub nodes: usize,
    pub bytes: u64,
}

#[derive(Debug, Default)]
pub struct PrepareReport {
    pub inputs: usize,
    pub prepared: Vec<PreparedItem>,
    pub failed: u64,
    pub skipped: u64,
}

impl PrepareReport {
    pub fn print(&self) {
        println!("prepare");
        println!("  inputs: {}", self.inputs);
        println!("  prepared: {}", self.prepared.len());
        println!("  failed: {}", self.failed);
        if self.skipped > 0 {
            println!("  skipped (cancelled): {}", self.skipped);
        }
        println!(
            "  nodes: {}",
            self.prepared.iter().map(|p| p.nodes).sum::<usize>()
        );
        println!(
            "  bytes: {}",
            self.prepared.iter().map(|p| p.bytes).sum::<u64>()
        );
        println!("ok");
    }
}

pub async fn run_prepare(options: &PrepareOptions, settings: &PoolSettings) -> Result<PrepareReport> {
    if let Some(progress) = &settings.progress {
        progress.report(StageProgressEvent::Discovering {
            stage: "prepare".to_string(),
        });
    }

    fs::create_dir_all(&options.output).with_context(|| {
        format!("Failed to create output directory {}", options.output.display())
    })?;
    let files = discover_files(&options.selection)?;
    let inputs = files.len();
    info!(inputs, output = %options.output.display(), "preparing inputs");

    let builder = Arc::new(TreeBuilder::new(options.tree.clone()));
    let output = options.output.clone();
    let codec = options
        .compress_output
        .then(|| ArchiveCodec::new(options.tree.compression_level));

    let report = settings
        .pool("prepare")
        .run_blocking(files, move |file| {
            prepare_one(&builder, &output, &file, codec.as_ref())
        })
        .await;

    let mut prepared = report.outputs;
    prepared.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(PrepareReport {
        inputs,
        prepared,
        failed: report.failed,
        skipped: report.skipped,
    })
}

/// Copy `input` into a fresh `<output_root>/<uuid>/data/` and describe it.
pub fn prepare_one(
    builder: &TreeBuilder,
    output_root: &Path,
    input: &Path,
    codec: Option<&ArchiveCodec>,
) -> Result<PreparedItem> {
    let id = Uuid::new_v4().to_string();
    let item_dir = output_root.join(&id);
    let data_dir = item_dir.join(DATA_DIR);
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let name = input
        .file_name()
        .with_context(|| format!("Input has no file name: {}", input.display()))?;
    let copy = data_dir.join(name);
    fs::copy(input, &copy).with_context(|| {
        format!("Failed to copy {} to {}", input.display(), copy.display())
    })?;

    let tree = builder
        .build(&id, &copy)
        .with_context(|| format!("Failed to describe {}", input.display()))?;
    persist::write_tree(&item_dir, &tree)?;

    if let Some(codec) = codec {
        codec
            .pack(&data_dir)
            .with_context(|| format!("Failed to pack {}", data_dir.display()))?;
        fs::remove_dir_all(&data_dir)
            .with_context(|| format!("Failed to remove {}", data_dir.display()))?;
    }

    info!(
        input = %input.display(),
        dir = %item_dir.display(),
        nodes = tree.node_count(),
        "prepared"
    );
    Ok(PreparedItem {
        source: input.to_path_buf(),
        dir: item_dir,
        nodes: tree.node_count(),
        bytes: tree.total_size(),
    })
}
