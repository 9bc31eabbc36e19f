//! Typed errors for the components whose failures callers match on.
//!
//! Stages and the CLI work in `anyhow::Result`; these enums convert into it
//! through `?` and keep their variant for `downcast_ref` when a caller needs
//! to tell a bad archive from a bad path.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while packing or unpacking a `.compressed` archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// The archive holds an entry whose path escapes the destination.
    #[error("refusing to unpack entry outside destination: {}", .0.display())]
    UnsafeEntry(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Failure while selecting fragment extractor modules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModuleError {
    #[error("unknown extractor module '{0}'. Expected one of: email, ip, domain, phonenumber")]
    Unknown(String),

    #[error("invalid pattern for module '{module}': {message}")]
    Pattern { module: String, message: String },
}
