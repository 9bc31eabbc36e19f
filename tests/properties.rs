//! Property tests for chunking, archives, fingerprints and de-duplication.

use dump_harness::archive::ArchiveCodec;
use dump_harness::dedup::dedup;
use dump_harness::fingerprint;
use dump_harness::splitter::split_file;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;

fn line_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9@.:]{0,40}"
}

/// Property: concatenating the chunks in part order reproduces the input,
/// and no chunk exceeds the limit unless it holds a single longer line.
#[test]
fn prop_chunks_concatenate_to_input() {
    let config = ProptestConfig::with_cases(48);
    proptest!(config, |(
        lines in prop::collection::vec(line_strategy(), 0..60),
        trailing_newline in any::<bool>(),
        max in 1u64..200
    )| {
        let tmp = tempfile::tempdir().unwrap();
        let mut body = lines.join("\n");
        if trailing_newline && !body.is_empty() {
            body.push('\n');
        }
        let input = tmp.path().join("input.txt");
        fs::write(&input, &body).unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();

        let summary = split_file(&input, &out, max).unwrap();

        let mut joined = Vec::new();
        for part in &summary.files {
            let bytes = fs::read(part).unwrap();
            let line_count = bytes.iter().filter(|b| **b == b'\n').count()
                + usize::from(!bytes.ends_with(b"\n"));
            prop_assert!(
                bytes.len() as u64 <= max || line_count == 1,
                "chunk of {} bytes over limit {} holds {} lines",
                bytes.len(),
                max,
                line_count
            );
            joined.extend_from_slice(&bytes);
        }
        prop_assert_eq!(joined, body.as_bytes().to_vec());
        prop_assert_eq!(summary.bytes, body.len() as u64);
        prop_assert_eq!(summary.chunks, summary.files.len());
    });
}

/// Property: unpack(pack(dir)) recreates every relative path and its bytes.
#[test]
fn prop_archive_round_trip() {
    let config = ProptestConfig::with_cases(24);
    proptest!(config, |(
        files in prop::collection::btree_map(
            "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.txt",
            prop::collection::vec(any::<u8>(), 0..512),
            1..8,
        )
    )| {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        for (relative, content) in &files {
            let path = src.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }

        let codec = ArchiveCodec::default();
        let archive = tmp.path().join("src.compressed");
        codec.pack_to(&src, &archive).unwrap();
        let dest = tmp.path().join("dest");
        codec.unpack_to(&archive, &dest).unwrap();

        let mut restored = BTreeMap::new();
        for entry in walkdir::WalkDir::new(&dest) {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(&dest)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                restored.insert(relative, fs::read(entry.path()).unwrap());
            }
        }
        prop_assert_eq!(restored, files);
    });
}

/// Property: the fingerprint depends only on content, not on read chunking.
#[test]
fn prop_fingerprint_is_stable() {
    proptest!(|(content in prop::collection::vec(any::<u8>(), 0..4096))| {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f.bin");
        fs::write(&path, &content).unwrap();

        let from_file = fingerprint::hash_file(&path).unwrap();
        prop_assert_eq!(from_file, fingerprint::hash_file(&path).unwrap());
        prop_assert_eq!(from_file, fingerprint::hash_reader(content.as_slice()).unwrap());
    });
}

/// Property: dedup is idempotent and keeps first occurrences in order.
#[test]
fn prop_dedup_keeps_first_occurrences() {
    proptest!(|(list in prop::collection::vec("[a-c]{1,2}", 0..50))| {
        let once = dedup(list.clone());
        prop_assert_eq!(dedup(once.clone()), once.clone());

        let mut expected: Vec<String> = Vec::new();
        for item in &list {
            if !expected.contains(item) {
                expected.push(item.clone());
            }
        }
        prop_assert_eq!(once, expected);
    });
}
