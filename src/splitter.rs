//! Line-safe file splitting.
//!
//! Splits one input file into `<basename>.part<N>` chunk files whose sizes
//! stay under a byte threshold without ever cutting a line. Concatenating the
//! chunks in index order yields the input byte for byte.
//!
//! The threshold is checked before a line is appended: a new chunk starts
//! when the next line would push the current one past `max_chunk_bytes`.
//! A line longer than the threshold therefore lands alone in its own chunk.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Suffix of the directory that replaces a chunked file.
pub const CHUNKED_SUFFIX: &str = ".chunked";

const READ_BUFFER: usize = 1 << 20;

/// Result of splitting one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitSummary {
    /// Number of chunk files written.
    pub chunks: usize,
    /// Number of lines read, counting an unterminated final line.
    pub lines: u64,
    /// Total bytes written across all chunks.
    pub bytes: u64,
    /// Chunk files in part order.
    pub files: Vec<PathBuf>,
}

/// A file that was replaced by its chunk directory.
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    pub dir: PathBuf,
    pub summary: SplitSummary,
}

/// Split `input` into chunk files under `output_dir`.
///
/// Chunks are opened lazily, so an empty input yields no chunk files. On a
/// write error the partially written chunk stays on disk.
pub fn split_file(input: &Path, output_dir: &Path, max_chunk_bytes: u64) -> Result<SplitSummary> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open input for splitting: {}", input.display()))?;
    let base = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("Input has no file name: {}", input.display()))?;

    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut summary = SplitSummary::default();
    let mut writer: Option<BufWriter<File>> = None;
    let mut current: u64 = 0;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        if n == 0 {
            break;
        }
        let len = n as u64;
        summary.lines += 1;

        let rotate = writer.is_none() || (current > 0 && current + len > max_chunk_bytes);
        if rotate {
            if let Some(mut previous) = writer.take() {
                previous.flush().context("Failed to flush chunk")?;
            }
            let path = output_dir.join(format!("{}.part{}", base, summary.files.len()));
            let chunk = File::create(&path)
                .with_context(|| format!("Failed to create chunk: {}", path.display()))?;
            debug!(chunk = %path.display(), "opened chunk");
            writer = Some(BufWriter::new(chunk));
            summary.files.push(path);
            current = 0;
        }

        if let Some(out) = writer.as_mut() {
            out.write_all(&line)
                .with_context(|| format!("Failed to write chunk of {}", input.display()))?;
        }
        current += len;
        summary.bytes += len;
    }

    if let Some(mut last) = writer.take() {
        last.flush().context("Failed to flush final chunk")?;
    }

    summary.chunks = summary.files.len();
    Ok(summary)
}

/// Replace `path` with a sibling `<name>.chunked` directory holding its chunks.
///
/// The original file is removed only after every chunk has been written.
pub fn chunkify(path: &Path, max_chunk_bytes: u64) -> Result<ChunkedFile> {
    let dir = chunk_dir_for(path)?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create chunk directory: {}", dir.display()))?;

    let summary = split_file(path, &dir, max_chunk_bytes)?;

    fs::remove_file(path)
        .with_context(|| format!("Failed to remove chunked original: {}", path.display()))?;

    info!(
        path = %path.display(),
        chunks = summary.chunks,
        lines = summary.lines,
        "chunked file"
    );
    Ok(ChunkedFile { dir, summary })
}

/// `<dir>/<name>.chunked` for `<dir>/<name>`.
pub fn chunk_dir_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .with_context(|| format!("Path has no file name: {}", path.display()))?;
    let mut dir_name = name.to_os_string();
    dir_name.push(CHUNKED_SUFFIX);
    Ok(path.with_file_name(dir_name))
}

/// Part index of a chunk file name (`big.txt.part12` → `12`).
pub fn part_index(file_name: &str) -> Option<usize> {
    let (_, index) = file_name.rsplit_once(".part")?;
    index.parse().ok()
}
