//! Directory archives: a tar stream compressed with zstd.
//!
//! `pack` turns `foo.extracted/` (or any `foo/`) into `foo.compressed` next to
//! it, and `unpack` turns `foo.compressed` into `foo.extracted/`, so
//! `pack(unpack(a))` writes back to `a`. Only relative paths, the file or
//! directory type, and file bytes are meant to survive a round trip.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// File name suffix of a packed archive.
pub const ARCHIVE_SUFFIX: &str = ".compressed";
/// Directory name suffix of an unpacked archive.
pub const EXTRACTED_SUFFIX: &str = ".extracted";

/// Default zstd level.
pub const DEFAULT_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct ArchiveCodec {
    level: i32,
}

impl Default for ArchiveCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl ArchiveCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    /// Pack `dir` into its sibling archive and return the archive path.
    ///
    /// The archive is written under a temporary name first and renamed over
    /// any existing archive once complete.
    pub fn pack(&self, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let archive = archive_path_for(dir);
        let mut tmp_name = archive.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        self.pack_to(dir, &tmp)?;
        fs::rename(&tmp, &archive)?;
        Ok(archive)
    }

    /// Unpack `archive` into its sibling `.extracted` directory and return it.
    pub fn unpack(&self, archive: &Path) -> Result<PathBuf, ArchiveError> {
        let dest = extracted_path_for(archive);
        self.unpack_to(archive, &dest)?;
        Ok(dest)
    }

    /// Write every entry under `dir` into a new archive at `archive`.
    pub fn pack_to(&self, dir: &Path, archive: &Path) -> Result<(), ArchiveError> {
        if !dir.is_dir() {
            return Err(ArchiveError::NotADirectory(dir.to_path_buf()));
        }

        let file = File::create(archive)?;
        let encoder = zstd::Encoder::new(BufWriter::new(file), self.level)?;
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        let mut entries = 0usize;
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                builder.append_dir(relative, entry.path())?;
            } else if file_type.is_file() {
                builder.append_path_with_name(entry.path(), relative)?;
            } else {
                warn!(path = %entry.path().display(), "skipping non-regular entry while packing");
                continue;
            }
            entries += 1;
        }

        let encoder = builder.into_inner()?;
        let mut out = encoder.finish()?;
        out.flush()?;

        debug!(dir = %dir.display(), archive = %archive.display(), entries, "packed archive");
        Ok(())
    }

    /// Recreate the archive's entries under `dest`.
    pub fn unpack_to(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
        let file = File::open(archive)?;
        let decoder = zstd::Decoder::new(file)?;
        let mut tar = tar::Archive::new(decoder);
        fs::create_dir_all(dest)?;

        let mut entries = 0usize;
        for entry in tar.entries()? {
            let mut entry = entry?;
            if !entry.unpack_in(dest)? {
                return Err(ArchiveError::UnsafeEntry(entry.path()?.into_owned()));
            }
            entries += 1;
        }

        debug!(archive = %archive.display(), dest = %dest.display(), entries, "unpacked archive");
        Ok(())
    }
}

/// Whether a file name marks a packed archive.
pub fn is_archive_name(name: &str) -> bool {
    name.len() > ARCHIVE_SUFFIX.len() && name.ends_with(ARCHIVE_SUFFIX)
}

/// `foo.extracted` → `foo.compressed`, `foo` → `foo.compressed`.
pub fn archive_path_for(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.strip_suffix(EXTRACTED_SUFFIX).unwrap_or(&name);
    dir.with_file_name(format!("{}{}", stem, ARCHIVE_SUFFIX))
}

/// `foo.compressed` → `foo.extracted`, `foo` → `foo.extracted`.
pub fn extracted_path_for(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(&name);
    archive.with_file_name(format!("{}{}", stem, EXTRACTED_SUFFIX))
}
