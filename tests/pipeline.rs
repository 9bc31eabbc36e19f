use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dump_harness::config::Config;
use dump_harness::discovery::InputSelection;
use dump_harness::extract_cmd::{run_extract, ExtractOptions};
use dump_harness::optimize::{run_optimize, OptimizeOptions};
use dump_harness::pool::PoolSettings;
use dump_harness::populate::{run_populate, PopulateOptions, RecordSource};
use dump_harness::prepare::{run_prepare, PrepareOptions};
use dump_harness::sink::{deliver, BatchSink, HttpSink, SinkDocument};

#[derive(Default)]
struct Received {
    batches: Vec<(String, usize)>,
    ids: Vec<String>,
}

type Shared = Arc<Mutex<Received>>;

async fn update(
    State(received): State<Shared>,
    UrlPath(collection): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
    Json(docs): Json<Vec<SinkDocument>>,
) -> StatusCode {
    if params.get("commit").map(String::as_str) != Some("true")
        || params.get("overwrite").map(String::as_str) != Some("true")
    {
        return StatusCode::BAD_REQUEST;
    }
    if docs.iter().any(|d| d.id == "poison") {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let mut received = received.lock().unwrap();
    received.batches.push((collection, docs.len()));
    received.ids.extend(docs.into_iter().map(|d| d.id));
    StatusCode::OK
}

async fn start_server() -> (String, Shared) {
    let received: Shared = Arc::new(Mutex::new(Received::default()));
    let app = Router::new()
        .route("/solr/{collection}/update", post(update))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/solr", addr), received)
}

fn doc(id: &str) -> SinkDocument {
    SinkDocument {
        id: id.to_string(),
        emails: vec![format!("{}@example.com", id)],
        ips: Vec::new(),
        domains: Vec::new(),
        phonenumbers: Vec::new(),
    }
}

#[tokio::test]
async fn test_http_sink_posts_batches() {
    let (url, received) = start_server().await;
    let sink = HttpSink::new(&url, "BigBoi", Duration::from_secs(5)).unwrap();

    let docs: Vec<SinkDocument> = (0..5).map(|i| doc(&format!("d{}", i))).collect();
    let outcome = deliver(&sink, &docs, 2).await;

    assert_eq!(outcome.accepted, 5);
    assert_eq!(outcome.rejected, 0);
    let received = received.lock().unwrap();
    assert_eq!(
        received.batches,
        vec![
            ("BigBoi".to_string(), 2),
            ("BigBoi".to_string(), 2),
            ("BigBoi".to_string(), 1)
        ]
    );
    assert_eq!(received.ids, vec!["d0", "d1", "d2", "d3", "d4"]);
}

#[tokio::test]
async fn test_http_sink_counts_refused_batch() {
    let (url, received) = start_server().await;
    let sink = HttpSink::new(&url, "BigBoi", Duration::from_secs(5)).unwrap();

    let docs = vec![doc("a"), doc("b"), doc("poison"), doc("c")];
    let outcome = deliver(&sink, &docs, 2).await;

    assert_eq!(outcome.accepted, 2);
    assert_eq!(outcome.rejected, 2);
    assert_eq!(received.lock().unwrap().ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unreachable_sink_rejects_everything() {
    let sink = HttpSink::new("http://127.0.0.1:1", "BigBoi", Duration::from_millis(500)).unwrap();
    let outcome = deliver(&sink, &[doc("a"), doc("b"), doc("c")], 2).await;
    assert_eq!(outcome.accepted, 0);
    assert_eq!(outcome.rejected, 3);
}

fn write_inputs(root: &Path) {
    fs::create_dir_all(root.join("dumps/inner")).unwrap();
    let mut big = String::new();
    for i in 0..30 {
        big.push_str(&format!("admin{}@corp.example 192.168.0.{}\n", i % 3, i % 2));
    }
    fs::write(root.join("dumps/big.log"), big).unwrap();
    fs::write(root.join("dumps/inner/notes.md"), "call +44 20 7946 0958\n").unwrap();
}

#[tokio::test]
async fn test_library_pipeline_into_http_sink() {
    let tmp = tempfile::tempdir().unwrap();
    write_inputs(tmp.path());
    let work = tmp.path().join("work");
    let settings = PoolSettings::new(3);

    let mut config = Config::default();
    config.prepare.chunk_size = 200;
    config.prepare.compress_output = true;
    let prepare = PrepareOptions::from_config(
        &config,
        InputSelection {
            directories: vec![tmp.path().join("dumps")],
            recursive: true,
            ..Default::default()
        },
        work.clone(),
        "2024-02-02".to_string(),
        None,
    );
    let prepared = run_prepare(&prepare, &settings).await.unwrap();
    assert_eq!(prepared.prepared.len(), 2);

    let selection = InputSelection {
        directories: vec![work.clone()],
        ..Default::default()
    };
    let extracted = run_extract(
        &ExtractOptions {
            selection: selection.clone(),
            overwrite: false,
            modules: Vec::new(),
            compression_level: config.prepare.compression_level,
        },
        &settings,
    )
    .await
    .unwrap();
    assert_eq!(extracted.extracted, 2);
    assert_eq!(extracted.failed_leaves, 0);

    let optimized = run_optimize(
        &OptimizeOptions {
            selection: selection.clone(),
            overwrite: false,
        },
        &settings,
    )
    .await
    .unwrap();
    assert_eq!(optimized.optimized, 2);
    assert!(optimized.fragments_after < optimized.fragments_before);

    let (url, received) = start_server().await;
    let sink: Arc<dyn BatchSink> =
        Arc::new(HttpSink::new(&url, "leaks", Duration::from_secs(5)).unwrap());
    let populated = run_populate(
        &PopulateOptions {
            selection,
            source: RecordSource::Optimized,
            batch_size: 3,
        },
        sink,
        &settings,
    )
    .await
    .unwrap();

    assert_eq!(populated.rejected, 0);
    assert_eq!(populated.accepted, populated.documents);
    let received = received.lock().unwrap();
    assert_eq!(received.ids.len() as u64, populated.documents);
    assert!(received.batches.iter().all(|(c, n)| c == "leaks" && *n <= 3));
}
