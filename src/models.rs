//! Core data models used throughout the pipeline.
//!
//! These types are what the stages persist and pass between each other: the
//! metadata tree written by `prepare` and the extraction records written by
//! `extract` and `optimize`.

use serde::{Deserialize, Serialize};

/// What a [`MetadataNode`] stands for on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A regular file read as-is.
    File,
    /// A directory; children live in `<parent>/<path>/`.
    Directory,
    /// A file replaced by its chunks; children live in `<parent>/<path>/`.
    Chunked,
    /// A packed archive; children live in `<parent>/<stem>.extracted/`
    /// while it is unpacked.
    Archive,
}

/// One node of the metadata tree.
///
/// Leaves carry the size and fingerprint of their bytes. Branches carry
/// `size == 0` and `fingerprint == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataNode {
    pub id: String,
    pub date: String,
    pub path: String,
    pub kind: NodeKind,
    pub size: u64,
    pub fingerprint: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MetadataNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl MetadataNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// A leaf with a fingerprint can be handed to the extractor.
    pub fn is_readable(&self) -> bool {
        self.is_leaf() && self.fingerprint != 0
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Sum of leaf sizes in this subtree.
    pub fn total_size(&self) -> u64 {
        if self.is_leaf() {
            self.size
        } else {
            self.children.iter().map(|c| c.total_size()).sum()
        }
    }
}

/// Fragments found in one chunk file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub id: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub phonenumbers: Vec<String>,
}

impl ExtractedRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn fragment_count(&self) -> usize {
        self.emails.len() + self.ips.len() + self.domains.len() + self.phonenumbers.len()
    }
}

/// The extraction output of one prepared directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataList {
    pub items: Vec<ExtractedRecord>,
}

/// Where a `chunkify` output directory came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSetInfo {
    /// Label for the chunk set; the input's file name unless given.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Absolute path of the source input.
    pub source: String,
    /// Absolute path of the directory holding the parts.
    pub path: String,
    pub lines: u64,
    pub parts: usize,
}
