//! The `extract` stage.
//!
//! For every prepared directory (one holding `_info.json`):
//!
//! 1. skip it if `_metadata.json` exists and overwrite is off
//! 2. unpack `data.compressed` into `data/` when only the archive is left
//! 3. open every archive node of the tree into scratch directories
//! 4. scan every readable leaf on the task pool
//! 5. write the records, in tree order, to `_metadata.json`
//!
//! Scratch directories, and a `data/` unpacked in step 2, are removed
//! afterwards whether or not extraction succeeded. Directories are handled
//! one after another; the leaves of a directory are scanned concurrently.
//!
//! A directory whose scan was cancelled gets no `_metadata.json`, so the next
//! run picks it up again instead of skipping it as finished.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::archive::{self, ArchiveCodec};
use crate::discovery::{discover_prepared, InputSelection};
use crate::fragments::FragmentExtractor;
use crate::models::MetadataList;
use crate::persist::{self, DATA_DIR, INFO_FILE, METADATA_FILE};
use crate::pool::{blocking, PoolSettings};
use crate::progress::StageProgressEvent;
use crate::resolve::{readable_leaves, ArchiveScratch};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub selection: InputSelection,
    pub overwrite: bool,
    /// Module names; empty selects every module.
    pub modules: Vec<String>,
    pub compression_level: i32,
}

/// What extraction produced for one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirExtraction {
    pub leaves: u64,
    pub failed_leaves: u64,
    pub fragments: u64,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub directories: usize,
    pub extracted: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    /// Directories interrupted by cancellation, left without records.
    pub cancelled: usize,
    pub leaves: u64,
    pub failed_leaves: u64,
    pub fragments: u64,
}

impl ExtractReport {
    pub fn print(&self) {
        println!("extract");
        println!("  directories: {}", self.directories);
        println!("  extracted: {}", self.extracted);
        println!("  skipped (already extracted): {}", self.skipped_existing);
        println!("  failed: {}", self.failed);
        if self.cancelled > 0 {
            println!("  cancelled: {}", self.cancelled);
        }
        println!("  chunks scanned: {}", self.leaves);
        if self.failed_leaves > 0 {
            println!("  chunks failed: {}", self.failed_leaves);
        }
        println!("  fragments: {}", self.fragments);
        println!("ok");
    }
}

pub async fn run_extract(options: &ExtractOptions, settings: &PoolSettings) -> Result<ExtractReport> {
    let extractor = Arc::new(FragmentExtractor::from_names(&options.modules)?);
    let codec = ArchiveCodec::new(options.compression_level);

    if let Some(progress) = &settings.progress {
        progress.report(StageProgressEvent::Discovering {
            stage: "extract".to_string(),
        });
    }
    let dirs = discover_prepared(&options.selection, INFO_FILE)?;
    info!(
        directories = dirs.len(),
        modules = ?extractor.kinds(),
        "extracting fragments"
    );

    let mut report = ExtractReport {
        directories: dirs.len(),
        ..Default::default()
    };
    for dir in dirs {
        if settings.cancel.is_cancelled() {
            warn!("extraction cancelled; remaining directories left untouched");
            break;
        }
        if dir.join(METADATA_FILE).exists() && !options.overwrite {
            info!(dir = %dir.display(), "already extracted; skipping");
            report.skipped_existing += 1;
            continue;
        }

        match extract_dir(&dir, extractor.clone(), codec, settings).await {
            Ok(done) => {
                report.extracted += 1;
                report.leaves += done.leaves;
                report.failed_leaves += done.failed_leaves;
                report.fragments += done.fragments;
            }
            Err(e) if settings.cancel.is_cancelled() => {
                report.cancelled += 1;
                warn!(dir = %dir.display(), error = %format!("{:#}", e), "extraction interrupted");
            }
            Err(e) => {
                report.failed += 1;
                warn!(dir = %dir.display(), error = %format!("{:#}", e), "extraction failed");
            }
        }
    }
    Ok(report)
}

/// Extract one prepared directory into its `_metadata.json`.
///
/// Fails without writing anything if `settings.cancel` fires before every
/// leaf was scanned.
pub async fn extract_dir(
    dir: &Path,
    extractor: Arc<FragmentExtractor>,
    codec: ArchiveCodec,
    settings: &PoolSettings,
) -> Result<DirExtraction> {
    let data = dir.join(DATA_DIR);
    let packed = archive::archive_path_for(&data);
    // The archive is the whole data set; a `data/` next to it is a leftover
    // of an interrupted unpack.
    let unpacked_data = packed.is_file();
    if unpacked_data {
        let (packed, data) = (packed.clone(), data.clone());
        blocking(move || {
            if data.exists() {
                warn!(dir = %data.display(), "removing stale unpacked data");
                fs::remove_dir_all(&data)
                    .with_context(|| format!("Failed to remove stale {}", data.display()))?;
            }
            codec
                .unpack_to(&packed, &data)
                .with_context(|| format!("Failed to unpack {}", packed.display()))
        })
        .await?;
    }

    let result = extract_tree(dir, &data, extractor, codec, settings).await;

    if unpacked_data {
        if let Err(e) = fs::remove_dir_all(&data) {
            warn!(dir = %data.display(), error = %e, "failed to remove unpacked data");
        }
    }
    result
}

async fn extract_tree(
    dir: &Path,
    data: &Path,
    extractor: Arc<FragmentExtractor>,
    codec: ArchiveCodec,
    settings: &PoolSettings,
) -> Result<DirExtraction> {
    let tree = persist::read_tree(dir)?;

    let scratch = {
        let (tree, data) = (tree.clone(), data.to_path_buf());
        blocking(move || ArchiveScratch::open(&tree, &data, &codec)).await?
    };

    let leaves = readable_leaves(&tree, data);
    let order: HashMap<String, usize> = leaves
        .iter()
        .enumerate()
        .map(|(index, leaf)| (leaf.id.clone(), index))
        .collect();

    let report = settings
        .pool("extract")
        .run_blocking(leaves, move |leaf| extractor.extract(&leaf.id, &leaf.path))
        .await;

    blocking(move || scratch.cleanup()).await?;

    if report.skipped > 0 || settings.cancel.is_cancelled() {
        bail!(
            "extraction of {} cancelled with {} of {} chunks unscanned",
            dir.display(),
            report.skipped,
            report.total()
        );
    }

    let mut items = report.outputs;
    items.sort_by_key(|record| order.get(&record.id).copied().unwrap_or(usize::MAX));
    let fragments = items.iter().map(|r| r.fragment_count() as u64).sum();

    let path: PathBuf = dir.join(METADATA_FILE);
    persist::write_records(&path, &MetadataList { items })?;
    info!(
        dir = %dir.display(),
        leaves = report.succeeded,
        failed = report.failed,
        fragments,
        "wrote extraction records"
    );

    Ok(DirExtraction {
        leaves: report.succeeded,
        failed_leaves: report.failed,
        fragments,
    })
}
