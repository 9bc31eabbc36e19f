//! The `optimize` stage: de-duplicate every list of every record.
//!
//! Reads `_metadata.json`, writes `_metadata.opti.json` next to it. The raw
//! file is kept. Directories that already hold an optimized file are skipped
//! unless overwrite is on.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::dedup::dedup_record;
use crate::discovery::{discover_prepared, InputSelection};
use crate::models::MetadataList;
use crate::persist::{self, METADATA_FILE, OPTIMIZED_FILE};
use crate::pool::PoolSettings;

#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    pub selection: InputSelection,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirOptimization {
    Skipped,
    Optimized { before: u64, after: u64 },
}

#[derive(Debug, Default)]
pub struct OptimizeReport {
    pub directories: usize,
    pub optimized: usize,
    pub skipped_existing: usize,
    pub failed: u64,
    pub fragments_before: u64,
    pub fragments_after: u64,
}

impl OptimizeReport {
    pub fn print(&self) {
        println!("optimize");
        println!("  directories: {}", self.directories);
        println!("  optimized: {}", self.optimized);
        println!("  skipped (already optimized): {}", self.skipped_existing);
        println!("  failed: {}", self.failed);
        println!("  fragments before: {}", self.fragments_before);
        println!("  fragments after: {}", self.fragments_after);
        println!("ok");
    }
}

pub async fn run_optimize(options: &OptimizeOptions, settings: &PoolSettings) -> Result<OptimizeReport> {
    let dirs = discover_prepared(&options.selection, METADATA_FILE)?;
    let directories = dirs.len();
    let overwrite = options.overwrite;

    let pool = settings
        .pool("optimize")
        .run_blocking(dirs, move |dir| optimize_dir(&dir, overwrite))
        .await;

    let mut report = OptimizeReport {
        directories,
        failed: pool.failed,
        ..Default::default()
    };
    for outcome in pool.outputs {
        match outcome {
            DirOptimization::Skipped => report.skipped_existing += 1,
            DirOptimization::Optimized { before, after } => {
                report.optimized += 1;
                report.fragments_before += before;
                report.fragments_after += after;
            }
        }
    }
    Ok(report)
}

pub fn optimize_dir(dir: &Path, overwrite: bool) -> Result<DirOptimization> {
    let target = dir.join(OPTIMIZED_FILE);
    if target.exists() && !overwrite {
        info!(dir = %dir.display(), "already optimized; skipping");
        return Ok(DirOptimization::Skipped);
    }

    let raw = persist::read_records(&dir.join(METADATA_FILE))?;
    let before = fragment_total(&raw);
    let optimized = MetadataList {
        items: raw.items.into_iter().map(dedup_record).collect(),
    };
    let after = fragment_total(&optimized);
    persist::write_records(&target, &optimized)?;

    info!(dir = %dir.display(), before, after, "optimized records");
    Ok(DirOptimization::Optimized { before, after })
}

fn fragment_total(list: &MetadataList) -> u64 {
    list.items.iter().map(|r| r.fragment_count() as u64).sum()
}
