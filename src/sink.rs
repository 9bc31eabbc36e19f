//! Batch sinks: where de-duplicated records end up.
//!
//! A [`BatchSink`] accepts a bounded batch of [`SinkDocument`]s and reports
//! how many it accepted and rejected. [`deliver`] cuts a record collection
//! into fixed-size batches and feeds them to a sink one at a time. A batch
//! that errors is counted as rejected and not retried.
//!
//! Two sinks ship with the crate:
//!
//! | Sink | Target |
//! |------|--------|
//! | [`HttpSink`] | JSON array POSTed to `<url>/<collection>/update?commit=true&overwrite=true` |
//! | [`JsonLinesSink`] | One JSON document per line appended to a local file |

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SinkConfig;
use crate::models::ExtractedRecord;

/// The document shape sent to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkDocument {
    pub id: String,
    pub emails: Vec<String>,
    pub ips: Vec<String>,
    pub domains: Vec<String>,
    pub phonenumbers: Vec<String>,
}

impl From<ExtractedRecord> for SinkDocument {
    fn from(record: ExtractedRecord) -> Self {
        Self {
            id: record.id,
            emails: record.emails,
            ips: record.ips,
            domains: record.domains,
            phonenumbers: record.phonenumbers,
        }
    }
}

/// Accepted and rejected document counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub accepted: u64,
    pub rejected: u64,
}

impl BatchOutcome {
    pub fn accepted(n: usize) -> Self {
        Self {
            accepted: n as u64,
            rejected: 0,
        }
    }

    pub fn rejected(n: usize) -> Self {
        Self {
            accepted: 0,
            rejected: n as u64,
        }
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
    }
}

/// An external system that ingests bounded batches of documents.
///
/// Implementations decide per batch what counts as accepted. Returning `Err`
/// means the whole batch was not delivered; callers count it as rejected.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Short name for logs and summaries.
    fn name(&self) -> &str;

    async fn send(&self, batch: &[SinkDocument]) -> Result<BatchOutcome>;
}

/// Send `docs` to `sink` in batches of at most `batch_size`.
pub async fn deliver(sink: &dyn BatchSink, docs: &[SinkDocument], batch_size: usize) -> BatchOutcome {
    let mut total = BatchOutcome::default();
    for (index, batch) in docs.chunks(batch_size.max(1)).enumerate() {
        match sink.send(batch).await {
            Ok(outcome) => {
                debug!(
                    sink = sink.name(),
                    batch = index,
                    accepted = outcome.accepted,
                    rejected = outcome.rejected,
                    "batch delivered"
                );
                total.merge(outcome);
            }
            Err(e) => {
                warn!(
                    sink = sink.name(),
                    batch = index,
                    documents = batch.len(),
                    error = %format!("{:#}", e),
                    "batch rejected"
                );
                total.merge(BatchOutcome::rejected(batch.len()));
            }
        }
    }
    total
}

/// Build the sink named by `config.kind`.
pub fn create_sink(config: &SinkConfig) -> Result<Box<dyn BatchSink>> {
    match config.kind.as_str() {
        "http" => Ok(Box::new(HttpSink::new(
            &config.url,
            &config.collection,
            Duration::from_secs(config.timeout_secs),
        )?)),
        "jsonl" => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("sink.path is required for the jsonl sink"))?;
            Ok(Box::new(JsonLinesSink::create(path)?))
        }
        other => anyhow::bail!("Unknown sink kind: '{}'. Must be http or jsonl.", other),
    }
}

/// POSTs each batch as a JSON array to an update endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: update_endpoint(url, collection),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// `<url>/<collection>/update?commit=true&overwrite=true`.
pub fn update_endpoint(url: &str, collection: &str) -> String {
    format!(
        "{}/{}/update?commit=true&overwrite=true",
        url.trim_end_matches('/'),
        collection
    )
}

#[async_trait]
impl BatchSink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, batch: &[SinkDocument]) -> Result<BatchOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint))?;

        let status = response.status();
        if status.is_success() {
            Ok(BatchOutcome::accepted(batch.len()))
        } else {
            warn!(endpoint = %self.endpoint, status = status.as_u16(), "sink refused batch");
            Ok(BatchOutcome::rejected(batch.len()))
        }
    }
}

/// Appends one JSON document per line to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open sink file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BatchSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn send(&self, batch: &[SinkDocument]) -> Result<BatchOutcome> {
        let mut lines = Vec::new();
        for doc in batch {
            serde_json::to_writer(&mut lines, doc)?;
            lines.push(b'\n');
        }

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("sink writer lock poisoned"))?;
        writer
            .write_all(&lines)
            .and_then(|_| writer.flush())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        Ok(BatchOutcome::accepted(batch.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn docs(n: usize) -> Vec<SinkDocument> {
        (0..n)
            .map(|i| SinkDocument::from(ExtractedRecord::new(format!("doc-{}", i))))
            .collect()
    }

    struct CountingSink {
        calls: AtomicUsize,
        fail_call: Option<usize>,
    }

    #[async_trait]
    impl BatchSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, batch: &[SinkDocument]) -> Result<BatchOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_call {
                anyhow::bail!("backend unavailable");
            }
            Ok(BatchOutcome::accepted(batch.len()))
        }
    }

    #[tokio::test]
    async fn test_deliver_splits_into_batches() {
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
            fail_call: None,
        };
        let outcome = deliver(&sink, &docs(2501), 1000).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome, BatchOutcome { accepted: 2501, rejected: 0 });
    }

    #[tokio::test]
    async fn test_failed_batch_counted_as_rejected() {
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
            fail_call: Some(1),
        };
        let outcome = deliver(&sink, &docs(25), 10).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome, BatchOutcome { accepted: 15, rejected: 10 });
    }

    #[tokio::test]
    async fn test_deliver_nothing() {
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
            fail_call: None,
        };
        let outcome = deliver(&sink, &[], 10).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome, BatchOutcome::default());
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/docs.jsonl");
        let sink = JsonLinesSink::create(&path).unwrap();

        let outcome = deliver(&sink, &docs(5), 2).await;
        assert_eq!(outcome.accepted, 5);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        let first: SinkDocument = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, "doc-0");
    }

    #[test]
    fn test_update_endpoint() {
        assert_eq!(
            update_endpoint("http://localhost:8983/solr/", "BigBoi"),
            "http://localhost:8983/solr/BigBoi/update?commit=true&overwrite=true"
        );
    }

    #[test]
    fn test_create_sink_requires_path_for_jsonl() {
        let config = SinkConfig {
            kind: "jsonl".to_string(),
            ..SinkConfig::default()
        };
        assert!(create_sink(&config).is_err());
    }

    #[test]
    fn test_document_from_record() {
        let mut record = ExtractedRecord::new("r");
        record.ips.push("1.2.3.4".to_string());
        let doc = SinkDocument::from(record);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["id"], "r");
        assert_eq!(json["ips"][0], "1.2.3.4");
    }
}
