//! Mapping a persisted tree back onto the file system.
//!
//! A node's physical location is its parent's child directory joined with
//! its `path`. Directories and chunk directories hold their children in
//! place. Archives hold them in a sibling `.extracted` directory that only
//! exists while [`ArchiveScratch`] keeps it unpacked.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::archive::{self, ArchiveCodec};
use crate::models::{MetadataNode, NodeKind};

/// A leaf the extractor can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadableLeaf {
    pub id: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Every readable leaf under `root`, where `base` is the directory holding
/// the root node itself. Order is a depth-first walk of the tree.
pub fn readable_leaves(root: &MetadataNode, base: &Path) -> Vec<ReadableLeaf> {
    let mut out = Vec::new();
    collect(root, base, &mut out);
    out
}

fn collect(node: &MetadataNode, parent_dir: &Path, out: &mut Vec<ReadableLeaf>) {
    let here = parent_dir.join(&node.path);
    if node.is_readable() {
        out.push(ReadableLeaf {
            id: node.id.clone(),
            path: here,
            size: node.size,
        });
        return;
    }
    if let Some(dir) = children_dir(node, parent_dir) {
        for child in &node.children {
            collect(child, &dir, out);
        }
    }
}

/// Where the children of `node` live, if it has any.
pub fn children_dir(node: &MetadataNode, parent_dir: &Path) -> Option<PathBuf> {
    match node.kind {
        NodeKind::File => None,
        NodeKind::Directory | NodeKind::Chunked => Some(parent_dir.join(&node.path)),
        NodeKind::Archive => Some(archive::extracted_path_for(&parent_dir.join(&node.path))),
    }
}

/// Archives unpacked so their leaves can be read.
///
/// Archive nodes are unpacked top-down, so an archive nested in another is
/// reachable once its parent is open. The directories are removed by
/// [`ArchiveScratch::cleanup`], or on drop if cleanup was never called.
pub struct ArchiveScratch {
    dirs: Vec<PathBuf>,
}

impl ArchiveScratch {
    pub fn open(root: &MetadataNode, base: &Path, codec: &ArchiveCodec) -> Result<Self> {
        let mut scratch = Self { dirs: Vec::new() };
        scratch.open_node(root, base, codec)?;
        Ok(scratch)
    }

    fn open_node(&mut self, node: &MetadataNode, parent_dir: &Path, codec: &ArchiveCodec) -> Result<()> {
        if node.is_leaf() {
            return Ok(());
        }
        if node.kind == NodeKind::Archive {
            let archive_path = parent_dir.join(&node.path);
            let dest = archive::extracted_path_for(&archive_path);
            if dest.exists() {
                fs::remove_dir_all(&dest)
                    .with_context(|| format!("Failed to clear stale {}", dest.display()))?;
            }
            codec
                .unpack_to(&archive_path, &dest)
                .with_context(|| format!("Failed to unpack {}", archive_path.display()))?;
            debug!(archive = %archive_path.display(), "opened archive for reading");
            self.dirs.push(dest);
        }
        if let Some(dir) = children_dir(node, parent_dir) {
            for child in &node.children {
                self.open_node(child, &dir, codec)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Remove every unpacked directory, innermost first.
    pub fn cleanup(mut self) -> Result<()> {
        self.remove_all()
    }

    fn remove_all(&mut self) -> Result<()> {
        while let Some(dir) = self.dirs.pop() {
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .with_context(|| format!("Failed to remove {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

impl Drop for ArchiveScratch {
    fn drop(&mut self) {
        if let Err(e) = self.remove_all() {
            warn!(error = %format!("{:#}", e), "failed to remove unpacked archive");
        }
    }
}
