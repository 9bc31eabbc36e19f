//! Input discovery.
//!
//! Turns `--input` files and `--directory` roots into the flat, sorted list
//! of paths a stage works on. `prepare` and `chunkify` want plain files;
//! the later stages want prepared output directories, recognised by the
//! marker file a previous stage left in them.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// What the user pointed a stage at.
#[derive(Debug, Clone, Default)]
pub struct InputSelection {
    pub inputs: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub recursive: bool,
    pub exclude_globs: Vec<String>,
}

impl InputSelection {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.directories.is_empty()
    }

    fn depth(&self) -> usize {
        if self.recursive {
            usize::MAX
        } else {
            1
        }
    }
}

/// Regular files named by `selection`, sorted and without duplicates.
///
/// Missing `--input` files are logged and skipped; a missing `--directory`
/// root is an error.
pub fn discover_files(selection: &InputSelection) -> Result<Vec<PathBuf>> {
    let exclude_set = build_globset(&selection.exclude_globs)?;
    let mut files = Vec::new();

    for input in &selection.inputs {
        if !input.is_file() {
            warn!(path = %input.display(), "input is not a readable file; skipping");
            continue;
        }
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if exclude_set.is_match(&name) {
            continue;
        }
        files.push(input.clone());
    }

    for root in &selection.directories {
        if !root.is_dir() {
            bail!("Input directory does not exist: {}", root.display());
        }
        for entry in WalkDir::new(root).min_depth(1).max_depth(selection.depth()) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if exclude_set.is_match(relative.to_string_lossy().as_ref()) {
                continue;
            }
            files.push(path.to_path_buf());
        }
    }

    // Sort for deterministic ordering
    files.sort();
    files.dedup();
    Ok(files)
}

/// Directories holding `marker`, found among `--input` paths and under
/// `--directory` roots. The walk does not descend into a directory once it
/// has been recognised.
pub fn discover_prepared(selection: &InputSelection, marker: &str) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    for input in &selection.inputs {
        if is_prepared(input, marker) {
            dirs.push(input.clone());
        } else {
            warn!(path = %input.display(), marker, "input has no marker file; skipping");
        }
    }

    for root in &selection.directories {
        if !root.is_dir() {
            bail!("Input directory does not exist: {}", root.display());
        }
        if is_prepared(root, marker) {
            dirs.push(root.clone());
            continue;
        }
        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(selection.depth())
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if is_prepared(entry.path(), marker) {
                dirs.push(entry.path().to_path_buf());
                walker.skip_current_dir();
            }
        }
    }

    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

fn is_prepared(dir: &Path, marker: &str) -> bool {
    dir.join(marker).is_file()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
