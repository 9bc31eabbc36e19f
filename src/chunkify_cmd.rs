//! The `chunkify` stage: split inputs into line-aligned chunks without
//! describing them.
//!
//! Each input is split into `<output>/<uuid>/<name>.part<N>`, next to a
//! `_chunks.json` naming the source; the input itself is left untouched.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::discovery::{discover_files, InputSelection};
use crate::models::ChunkSetInfo;
use crate::persist::{self, CHUNKS_INFO_FILE};
use crate::pool::PoolSettings;
use crate::splitter::{self, SplitSummary};

#[derive(Debug, Clone)]
pub struct ChunkifyOptions {
    pub selection: InputSelection,
    pub output: PathBuf,
    pub chunk_size: u64,
    /// Label recorded for every input; defaults to each input's file name.
    pub name: Option<String>,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct ChunkifyReport {
    pub inputs: usize,
    pub split: u64,
    pub failed: u64,
    pub chunks: u64,
    pub lines: u64,
    pub bytes: u64,
}

impl ChunkifyReport {
    pub fn print(&self) {
        println!("chunkify");
        println!("  inputs: {}", self.inputs);
        println!("  split: {}", self.split);
        println!("  failed: {}", self.failed);
        println!("  chunks written: {}", self.chunks);
        println!("  lines: {}", self.lines);
        println!("  bytes: {}", self.bytes);
        println!("ok");
    }
}

pub async fn run_chunkify(options: &ChunkifyOptions, settings: &PoolSettings) -> Result<ChunkifyReport> {
    if options.chunk_size == 0 {
        anyhow::bail!("chunk size must be > 0");
    }
    fs::create_dir_all(&options.output).with_context(|| {
        format!("Failed to create output directory {}", options.output.display())
    })?;
    let files = discover_files(&options.selection)?;
    let inputs = files.len();

    let output = options.output.clone();
    let chunk_size = options.chunk_size;
    let (name, description) = (options.name.clone(), options.description.clone());
    let report = settings
        .pool("chunkify")
        .run_blocking(files, move |file| -> Result<SplitSummary> {
            let dir = output.join(Uuid::new_v4().to_string());
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let summary = splitter::split_file(&file, &dir, chunk_size)?;
            let info = chunk_set_info(&file, &dir, name.as_deref(), &description, &summary)?;
            persist::write_json(&dir.join(CHUNKS_INFO_FILE), &info)?;
            info!(
                input = %file.display(),
                dir = %dir.display(),
                chunks = summary.chunks,
                "split"
            );
            Ok(summary)
        })
        .await;

    let mut totals = ChunkifyReport {
        inputs,
        split: report.succeeded,
        failed: report.failed,
        ..Default::default()
    };
    for summary in &report.outputs {
        totals.chunks += summary.chunks as u64;
        totals.lines += summary.lines;
        totals.bytes += summary.bytes;
    }
    Ok(totals)
}

fn chunk_set_info(
    input: &Path,
    dir: &Path,
    name: Option<&str>,
    description: &str,
    summary: &SplitSummary,
) -> Result<ChunkSetInfo> {
    let source = fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve {}", input.display()))?;
    let path =
        fs::canonicalize(dir).with_context(|| format!("Failed to resolve {}", dir.display()))?;
    let name = match name {
        Some(name) => name.to_string(),
        None => input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    Ok(ChunkSetInfo {
        name,
        description: description.to_string(),
        source: source.display().to_string(),
        path: path.display().to_string(),
        lines: summary.lines,
        parts: summary.chunks,
    })
}
