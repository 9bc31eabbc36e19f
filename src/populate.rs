//! The `populate` stage: push records into a [`BatchSink`].
//!
//! Each directory holding `_metadata.json` contributes its records, read
//! from the optimized file when one exists (or the raw file, with `--prefer
//! raw`). Directories are loaded and delivered concurrently on the task
//! pool; batches within one directory go out in order.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::discovery::{discover_prepared, InputSelection};
use crate::persist::{self, METADATA_FILE, OPTIMIZED_FILE};
use crate::pool::{blocking, PoolSettings};
use crate::sink::{deliver, BatchOutcome, BatchSink, SinkDocument};

/// Which records file a directory is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordSource {
    /// `_metadata.opti.json`, falling back to `_metadata.json`.
    #[default]
    Optimized,
    /// `_metadata.json`, falling back to `_metadata.opti.json`.
    Raw,
}

impl FromStr for RecordSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "opti" | "optimized" => Ok(RecordSource::Optimized),
            "raw" => Ok(RecordSource::Raw),
            other => Err(format!(
                "unknown record source '{}': expected opti or raw",
                other
            )),
        }
    }
}

/// The records file of `dir` to read for `source`, if any exists.
pub fn records_file(dir: &Path, source: RecordSource) -> Option<PathBuf> {
    let (first, second) = match source {
        RecordSource::Optimized => (OPTIMIZED_FILE, METADATA_FILE),
        RecordSource::Raw => (METADATA_FILE, OPTIMIZED_FILE),
    };
    [first, second]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[derive(Debug, Clone)]
pub struct PopulateOptions {
    pub selection: InputSelection,
    pub source: RecordSource,
    pub batch_size: usize,
}

#[derive(Debug, Default)]
pub struct PopulateReport {
    pub sink: String,
    pub directories: usize,
    pub delivered_dirs: u64,
    pub failed: u64,
    pub documents: u64,
    pub accepted: u64,
    pub rejected: u64,
}

impl PopulateReport {
    pub fn print(&self) {
        println!("populate {}", self.sink);
        println!("  directories: {}", self.directories);
        println!("  delivered: {}", self.delivered_dirs);
        println!("  failed: {}", self.failed);
        println!("  documents: {}", self.documents);
        println!("  accepted: {}", self.accepted);
        println!("  rejected: {}", self.rejected);
        println!("ok");
    }
}

pub async fn run_populate(
    options: &PopulateOptions,
    sink: Arc<dyn BatchSink>,
    settings: &PoolSettings,
) -> Result<PopulateReport> {
    if options.batch_size == 0 {
        anyhow::bail!("batch size must be > 0");
    }
    let dirs = discover_prepared(&options.selection, METADATA_FILE)?;
    let directories = dirs.len();
    info!(directories, sink = sink.name(), batch_size = options.batch_size, "populating");

    let source = options.source;
    let batch_size = options.batch_size;
    let worker_sink = sink.clone();
    let pool = settings
        .pool("populate")
        .run(dirs, move |dir| {
            let sink = worker_sink.clone();
            async move {
                let docs = blocking(move || load_documents(&dir, source)).await?;
                let outcome = deliver(sink.as_ref(), &docs, batch_size).await;
                Ok::<_, anyhow::Error>((docs.len() as u64, outcome))
            }
        })
        .await;

    let mut report = PopulateReport {
        sink: sink.name().to_string(),
        directories,
        delivered_dirs: pool.succeeded,
        failed: pool.failed,
        ..Default::default()
    };
    let mut total = BatchOutcome::default();
    for (documents, outcome) in pool.outputs {
        report.documents += documents;
        total.merge(outcome);
    }
    report.accepted = total.accepted;
    report.rejected = total.rejected;
    Ok(report)
}

/// Read the records of `dir` as sink documents.
pub fn load_documents(dir: &Path, source: RecordSource) -> Result<Vec<SinkDocument>> {
    let path = records_file(dir, source)
        .ok_or_else(|| anyhow::anyhow!("No records file in {}", dir.display()))?;
    let list = persist::read_records(&path)?;
    debug!(path = %path.display(), records = list.items.len(), "loaded records");
    Ok(list.items.into_iter().map(SinkDocument::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedRecord, MetadataList};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        batches: Mutex<Vec<Vec<SinkDocument>>>,
    }

    #[async_trait]
    impl BatchSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        async fn send(&self, batch: &[SinkDocument]) -> Result<BatchOutcome> {
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(BatchOutcome::accepted(batch.len()))
        }
    }

    fn write(dir: &Path, name: &str, ids: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        let items = ids.iter().map(|id| ExtractedRecord::new(*id)).collect();
        persist::write_records(&dir.join(name), &MetadataList { items }).unwrap();
    }

    #[test]
    fn test_records_file_preference() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), METADATA_FILE, &["raw"]);
        assert_eq!(
            records_file(tmp.path(), RecordSource::Optimized),
            Some(tmp.path().join(METADATA_FILE))
        );

        write(tmp.path(), OPTIMIZED_FILE, &["opti"]);
        assert_eq!(
            records_file(tmp.path(), RecordSource::Optimized),
            Some(tmp.path().join(OPTIMIZED_FILE))
        );
        assert_eq!(
            records_file(tmp.path(), RecordSource::Raw),
            Some(tmp.path().join(METADATA_FILE))
        );
    }

    #[test]
    fn test_record_source_parse() {
        assert_eq!("opti".parse::<RecordSource>(), Ok(RecordSource::Optimized));
        assert_eq!("RAW".parse::<RecordSource>(), Ok(RecordSource::Raw));
        assert!("both".parse::<RecordSource>().is_err());
    }

    #[tokio::test]
    async fn test_populate_batches_every_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("one"), METADATA_FILE, &["a", "b", "c"]);
        write(&tmp.path().join("one"), OPTIMIZED_FILE, &["a", "b"]);
        write(&tmp.path().join("two"), METADATA_FILE, &["d"]);

        let sink = Arc::new(MemorySink::default());
        let options = PopulateOptions {
            selection: InputSelection {
                directories: vec![tmp.path().to_path_buf()],
                ..Default::default()
            },
            source: RecordSource::Optimized,
            batch_size: 1,
        };
        let report = run_populate(&options, sink.clone(), &PoolSettings::new(2))
            .await
            .unwrap();

        assert_eq!(report.directories, 2);
        assert_eq!(report.documents, 3);
        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected, 0);

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 1));
        let mut ids: Vec<String> = batches.iter().map(|b| b[0].id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "d"]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let options = PopulateOptions {
            selection: InputSelection::default(),
            source: RecordSource::Raw,
            batch_size: 0,
        };
        let sink: Arc<dyn BatchSink> = Arc::new(MemorySink::default());
        assert!(run_populate(&options, sink, &PoolSettings::new(1)).await.is_err());
    }
}
