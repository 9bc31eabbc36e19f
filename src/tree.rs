//! Recursive metadata tree construction.
//!
//! [`TreeBuilder::build`] turns one input path into a [`MetadataNode`]:
//!
//! - directories become branches whose children are built in name order
//! - `.compressed` archives are unpacked, described, repacked in place
//! - oversized text files are split into a `.chunked` directory whose parts
//!   become the children
//! - everything else is a leaf with a size and fingerprint
//!
//! The archive check runs before the chunkability check, so an archive is
//! never chunked. Each file-system mutation happens once, before the builder
//! descends into whatever replaced the original path.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::{self, ArchiveCodec};
use crate::fingerprint;
use crate::models::{MetadataNode, NodeKind};
use crate::splitter;

/// Knobs that shape one tree-building run.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Files strictly larger than this many bytes are chunked.
    pub chunk_size: u64,
    /// Extensions eligible for chunking, with the leading dot.
    pub chunkable_extensions: Vec<String>,
    pub date: String,
    pub bucket: Option<String>,
    pub compression_level: i32,
}

pub struct TreeBuilder {
    options: TreeOptions,
    codec: ArchiveCodec,
    chunkable: HashSet<String>,
}

impl TreeBuilder {
    pub fn new(options: TreeOptions) -> Self {
        let chunkable = options
            .chunkable_extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        let codec = ArchiveCodec::new(options.compression_level);
        Self {
            options,
            codec,
            chunkable,
        }
    }

    /// Build the tree rooted at `path`, giving the root node `id`.
    pub fn build(&self, id: &str, path: &Path) -> Result<MetadataNode> {
        let meta = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let name = file_name(path)?;

        if meta.is_dir() {
            let children = self.build_entries(path)?;
            return Ok(self.branch(id, name, NodeKind::Directory, children));
        }

        if archive::is_archive_name(&name) {
            match self.build_archive(id, path, &name) {
                Ok(node) => return Ok(node),
                Err(ArchiveOutcome::Unreadable(e)) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "archive could not be unpacked; keeping it as a plain file"
                    );
                }
                Err(ArchiveOutcome::Failed(e)) => return Err(e),
            }
        } else if self.is_chunkable(&name, meta.len()) {
            return self.build_chunked(id, path);
        }

        let fingerprint = fingerprint::hash_file(path)
            .with_context(|| format!("Failed to fingerprint {}", path.display()))?;
        Ok(MetadataNode {
            id: id.to_string(),
            date: self.options.date.clone(),
            path: name,
            kind: NodeKind::File,
            size: meta.len(),
            fingerprint,
            children: Vec::new(),
            bucket: self.options.bucket.clone(),
        })
    }

    /// Whether a file of this name and size gets split into chunks.
    pub fn is_chunkable(&self, name: &str, size: u64) -> bool {
        size > self.options.chunk_size
            && extension_of(name)
                .map(|ext| self.chunkable.contains(&ext.to_ascii_lowercase()))
                .unwrap_or(false)
    }

    fn build_chunked(&self, id: &str, path: &Path) -> Result<MetadataNode> {
        let chunked = splitter::chunkify(path, self.options.chunk_size)?;
        let dir_name = file_name(&chunked.dir)?;

        let mut children = Vec::with_capacity(chunked.summary.files.len());
        for part in &chunked.summary.files {
            if let Some(child) = self.child(part) {
                children.push(child);
            }
        }
        Ok(self.branch(id, dir_name, NodeKind::Chunked, children))
    }

    fn build_archive(
        &self,
        id: &str,
        path: &Path,
        name: &str,
    ) -> std::result::Result<MetadataNode, ArchiveOutcome> {
        let extracted = archive::extracted_path_for(path);
        if let Err(e) = self.codec.unpack_to(path, &extracted) {
            if extracted.exists() {
                if let Err(e) = fs::remove_dir_all(&extracted) {
                    warn!(dir = %extracted.display(), error = %e, "failed to remove partial unpack");
                }
            }
            return Err(ArchiveOutcome::Unreadable(e.into()));
        }
        debug!(archive = %path.display(), into = %extracted.display(), "unpacked archive");

        let children = self.build_entries(&extracted).map_err(ArchiveOutcome::Failed)?;

        let repacked = self
            .codec
            .pack(&extracted)
            .with_context(|| format!("Failed to repack {}", extracted.display()))
            .map_err(ArchiveOutcome::Failed)?;
        fs::remove_dir_all(&extracted)
            .with_context(|| format!("Failed to remove {}", extracted.display()))
            .map_err(ArchiveOutcome::Failed)?;
        info!(archive = %repacked.display(), children = children.len(), "described archive");

        Ok(self.branch(id, name.to_string(), NodeKind::Archive, children))
    }

    /// Build one child per entry of `dir`, in name order, skipping failures.
    fn build_entries(&self, dir: &Path) -> Result<Vec<MetadataNode>> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .collect();
        entries.sort();

        Ok(entries.iter().filter_map(|p| self.child(p)).collect())
    }

    fn child(&self, path: &Path) -> Option<MetadataNode> {
        let id = Uuid::new_v4().to_string();
        match self.build(&id, path) {
            Ok(node) => Some(node),
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{:#}", e), "skipping child");
                None
            }
        }
    }

    fn branch(
        &self,
        id: &str,
        path: String,
        kind: NodeKind,
        children: Vec<MetadataNode>,
    ) -> MetadataNode {
        MetadataNode {
            id: id.to_string(),
            date: self.options.date.clone(),
            path,
            kind,
            size: 0,
            fingerprint: 0,
            children,
            bucket: self.options.bucket.clone(),
        }
    }
}

enum ArchiveOutcome {
    /// The archive itself could not be read; nothing was changed.
    Unreadable(anyhow::Error),
    Failed(anyhow::Error),
}

/// Extension of a file name, from its last dot: `a.tar.txt` → `.txt`,
/// `.gitignore` → `.gitignore`.
pub fn extension_of(name: &str) -> Option<&str> {
    name.rfind('.').map(|idx| &name[idx..])
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("Path has no file name: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(chunk_size: u64) -> TreeOptions {
        TreeOptions {
            chunk_size,
            chunkable_extensions: vec![".txt".to_string(), ".log".to_string()],
            date: "2024-05-01".to_string(),
            bucket: Some("combo".to_string()),
            compression_level: 1,
        }
    }

    #[test]
    fn test_directory_of_small_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("drop");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), b"one\n").unwrap();
        fs::write(root.join("b.txt"), b"two two\n").unwrap();
        fs::write(root.join("c.bin"), b"\x00\x01").unwrap();

        let node = TreeBuilder::new(options(1024)).build("root", &root).unwrap();

        assert_eq!(node.id, "root");
        assert_eq!(node.kind, NodeKind::Directory);
        assert_eq!(node.size, 0);
        assert_eq!(node.fingerprint, 0);
        assert_eq!(node.children.len(), 3);
        let names: Vec<&str> = node.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.bin"]);
        assert_eq!(node.children[1].size, 8);
        for child in &node.children {
            assert!(child.is_readable());
            assert_eq!(child.bucket.as_deref(), Some("combo"));
            assert_eq!(child.date, "2024-05-01");
        }
    }

    #[test]
    fn test_oversized_text_file_is_chunked() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("big.txt");
        fs::write(&file, "line\n".repeat(300)).unwrap();

        let node = TreeBuilder::new(options(500)).build("root", &file).unwrap();

        assert_eq!(node.kind, NodeKind::Chunked);
        assert_eq!(node.path, "big.txt.chunked");
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.total_size(), 1500);
        assert!(!file.exists());
        assert!(tmp.path().join("big.txt.chunked/big.txt.part2").exists());
        assert!(node.children.iter().all(|c| c.is_readable()));
    }

    #[test]
    fn test_oversized_unknown_extension_stays_leaf() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("big.bin");
        fs::write(&file, vec![b'x'; 2000]).unwrap();

        let node = TreeBuilder::new(options(500)).build("root", &file).unwrap();

        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, 2000);
        assert!(file.exists());
    }

    #[test]
    fn test_archive_is_described_and_repacked() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("bundle");
        fs::create_dir_all(src.join("inner")).unwrap();
        fs::write(src.join("inner/creds.txt"), "a@b.io\n".repeat(200)).unwrap();
        fs::write(src.join("readme.md"), b"hi\n").unwrap();
        let archive = ArchiveCodec::new(1).pack(&src).unwrap();
        fs::remove_dir_all(&src).unwrap();

        let node = TreeBuilder::new(options(500)).build("root", &archive).unwrap();

        assert_eq!(node.kind, NodeKind::Archive);
        assert_eq!(node.path, "bundle.compressed");
        assert!(archive.exists());
        assert!(!tmp.path().join("bundle.extracted").exists());

        let inner = node.children.iter().find(|c| c.path == "inner").unwrap();
        assert_eq!(inner.kind, NodeKind::Directory);
        assert_eq!(inner.children[0].kind, NodeKind::Chunked);

        // The repacked archive carries the chunked form.
        let restored = ArchiveCodec::new(1).unpack(&archive).unwrap();
        assert!(restored.join("inner/creds.txt.chunked/creds.txt.part0").exists());
        assert!(!restored.join("inner/creds.txt").exists());
    }

    #[test]
    fn test_corrupt_archive_falls_back_to_leaf() {
        let tmp = tempfile::tempdir().unwrap();
        let bogus = tmp.path().join("broken.compressed");
        fs::write(&bogus, b"not an archive").unwrap();

        let node = TreeBuilder::new(options(500)).build("root", &bogus).unwrap();

        assert_eq!(node.kind, NodeKind::File);
        assert!(node.is_readable());
        assert!(!tmp.path().join("broken.extracted").exists());
    }

    #[test]
    fn test_missing_root_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = TreeBuilder::new(options(500)).build("root", &tmp.path().join("gone"));
        assert!(result.is_err());
    }

    #[test]
    fn test_chunkable_rules() {
        let builder = TreeBuilder::new(options(100));
        assert!(builder.is_chunkable("dump.TXT", 101));
        assert!(!builder.is_chunkable("dump.txt", 100));
        assert!(!builder.is_chunkable("dump.zip", 1000));
        assert!(!builder.is_chunkable("noext", 1000));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.tar.txt"), Some(".txt"));
        assert_eq!(extension_of(".gitignore"), Some(".gitignore"));
        assert_eq!(extension_of("README"), None);
    }
}
