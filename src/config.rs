//! TOML configuration.
//!
//! Every section and key is optional; a missing file section takes the
//! defaults below. Command-line flags override what is loaded here.
//!
//! ```toml
//! [prepare]
//! chunk_size = 104857600
//! compress_output = false
//! compression_level = 3
//! exclude_globs = ["**/*.tmp"]
//!
//! [pool]
//! threads = 0            # one per CPU
//! task_timeout_secs = 0  # no deadline
//!
//! [extract]
//! modules = ["email", "ip", "domain", "phonenumber"]
//!
//! [sink]
//! kind = "http"          # or "jsonl" with `path`
//! url = "http://localhost:8983/solr"
//! collection = "BigBoi"
//! batch_size = 1000
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fragments::FragmentKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub prepare: PrepareConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrepareConfig {
    /// Files larger than this many bytes are split into chunks.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_chunkable_extensions")]
    pub chunkable_extensions: Vec<String>,
    /// Pack each prepared `data/` directory into `data.compressed`.
    #[serde(default)]
    pub compress_output: bool,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunkable_extensions: default_chunkable_extensions(),
            compress_output: false,
            compression_level: default_compression_level(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_chunk_size() -> u64 {
    100 * 1024 * 1024
}
fn default_compression_level() -> i32 {
    3
}

pub const CHUNKABLE_EXTENSIONS: &[&str] = &[
    ".txt", ".log", ".md", ".rst", ".json", ".xml", ".yaml", ".yml", ".toml", ".c", ".h", ".cpp",
    ".hpp", ".java", ".py", ".sh", ".bat", ".cmd", ".ps1", ".pl", ".rb", ".php", ".go", ".rs",
    ".js", ".ts", ".jsx", ".tsx", ".csv", ".tsv", ".ini", ".conf", ".cfg", ".env", ".sql",
    ".psql", ".dump", ".html", ".htm", ".xhtml", ".css", ".tex", ".bib", ".gitignore",
    ".gitattributes", ".patch", ".diff", ".manifest", ".license", ".readme", ".todo", ".nfo",
];

fn default_chunkable_extensions() -> Vec<String> {
    CHUNKABLE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PoolConfig {
    /// Worker slots; 0 means one per CPU.
    #[serde(default)]
    pub threads: usize,
    /// Per-item deadline in seconds; 0 disables it.
    #[serde(default)]
    pub task_timeout_secs: u64,
}

impl PoolConfig {
    pub fn threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            modules: default_modules(),
        }
    }
}

fn default_modules() -> Vec<String> {
    FragmentKind::ALL.iter().map(|k| k.name().to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    /// `http` or `jsonl`.
    #[serde(default = "default_sink_kind")]
    pub kind: String,
    #[serde(default = "default_sink_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Output file for the `jsonl` sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
            url: default_sink_url(),
            collection: default_collection(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            path: None,
        }
    }
}

fn default_sink_kind() -> String {
    "http".to_string()
}
fn default_sink_url() -> String {
    "http://localhost:8983/solr".to_string()
}
fn default_collection() -> String {
    "BigBoi".to_string()
}
fn default_batch_size() -> usize {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

impl Config {
    /// Check value ranges. Also run after CLI overrides are applied.
    pub fn validate(&self) -> Result<()> {
        // Validate prepare
        if self.prepare.chunk_size == 0 {
            anyhow::bail!("prepare.chunk_size must be > 0");
        }
        if !(1..=22).contains(&self.prepare.compression_level) {
            anyhow::bail!("prepare.compression_level must be in [1, 22]");
        }
        if let Some(bad) = self
            .prepare
            .chunkable_extensions
            .iter()
            .find(|e| !e.starts_with('.') || e.len() < 2)
        {
            anyhow::bail!(
                "prepare.chunkable_extensions entries must look like '.txt', got '{}'",
                bad
            );
        }

        // Validate extract
        for name in &self.extract.modules {
            name.parse::<FragmentKind>()?;
        }

        // Validate sink
        if self.sink.batch_size == 0 {
            anyhow::bail!("sink.batch_size must be > 0");
        }
        match self.sink.kind.as_str() {
            "http" | "jsonl" => {}
            other => anyhow::bail!("Unknown sink kind: '{}'. Must be http or jsonl.", other),
        }

        // Validate logging
        match self.logging.level.to_ascii_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => anyhow::bail!(
                "Unknown logging.level: '{}'. Must be off, error, warn, info, debug or trace.",
                other
            ),
        }

        Ok(())
    }
}
