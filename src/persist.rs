//! On-disk layout of a prepared directory.
//!
//! ```text
//! <output>/<uuid>/
//!     _info.json            metadata tree (prepare)
//!     _metadata.json        extraction records (extract)
//!     _metadata.opti.json   de-duplicated records (optimize)
//!     data/ | data.compressed
//! ```
//!
//! A `chunkify` output directory holds only `<name>.part<N>` files and
//! `_chunks.json`.
//!
//! Files are written to a `.tmp` sibling and renamed into place, so a file
//! under its final name is always complete.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::{MetadataList, MetadataNode};

pub const INFO_FILE: &str = "_info.json";
pub const METADATA_FILE: &str = "_metadata.json";
pub const OPTIMIZED_FILE: &str = "_metadata.opti.json";
pub const DATA_DIR: &str = "data";
pub const CHUNKS_INFO_FILE: &str = "_chunks.json";

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let file =
        File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    drop(writer);

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_tree(dir: &Path, tree: &MetadataNode) -> Result<()> {
    write_json(&dir.join(INFO_FILE), tree)
}

pub fn read_tree(dir: &Path) -> Result<MetadataNode> {
    read_json(&dir.join(INFO_FILE))
}

pub fn write_records(path: &Path, records: &MetadataList) -> Result<()> {
    write_json(path, records)
}

pub fn read_records(path: &Path) -> Result<MetadataList> {
    read_json(path)
}
