//! # Dump Harness
//!
//! A pipeline that turns large leak and dump corpora into searchable,
//! de-duplicated fragment records.
//!
//! Inputs are copied into per-input working directories, oversized text
//! files are split into line-aligned chunks, nested `.compressed` archives
//! are described in place, and every file ends up as a node of a persisted
//! metadata tree. Later stages scan the readable leaves of that tree for
//! emails, IPs, domains and phone numbers, de-duplicate the results and push
//! them into a batch sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  inputs  │──▶│   prepare    │──▶│ extract  │──▶│ optimize │──▶│ populate │
//! │files/dirs│   │ chunk+tree   │   │ fragments│   │  dedup   │   │  sink    │
//! └──────────┘   └──────┬───────┘   └────┬─────┘   └────┬─────┘   └────┬─────┘
//!                       ▼                ▼              ▼              ▼
//!                  _info.json     _metadata.json  _metadata.opti.json  HTTP / JSONL
//! ```
//!
//! Every stage runs its independent items on a bounded [`pool::TaskPool`].
//!
//! ## Quick Start
//!
//! ```bash
//! dump prepare -d ./dumps -r -o ./work --bucket combo
//! dump extract -d ./work
//! dump optimize -d ./work
//! dump populate -d ./work --url http://localhost:8983/solr
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Metadata tree and extraction records |
//! | [`splitter`] | Line-aligned file chunking |
//! | [`archive`] | tar + zstd directory archives |
//! | [`fingerprint`] | Streaming xxh64 content fingerprints |
//! | [`tree`] | Recursive metadata tree construction |
//! | [`resolve`] | Locating readable leaves of a persisted tree |
//! | [`pool`] | Bounded-concurrency task harness |
//! | [`fragments`] | Pattern-based fragment extraction |
//! | [`dedup`] | Order-preserving de-duplication |
//! | [`sink`] | Batch sinks (HTTP, JSON lines) |
//! | [`persist`] | Prepared directory layout and JSON files |
//! | [`discovery`] | Input file and prepared directory discovery |
//! | [`progress`] | Stage progress reporting on stderr |

pub mod archive;
pub mod chunkify_cmd;
pub mod config;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod extract_cmd;
pub mod fingerprint;
pub mod fragments;
pub mod models;
pub mod optimize;
pub mod persist;
pub mod pool;
pub mod populate;
pub mod prepare;
pub mod progress;
pub mod resolve;
pub mod sink;
pub mod splitter;
pub mod tree;
