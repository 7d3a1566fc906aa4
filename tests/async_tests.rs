//! Integration tests for the Tokio drivers.

#![cfg(feature = "async")]

mod common;

use std::fs;

use futures::StreamExt;
use tarstream::async_io::{AsyncPack, AsyncTarReader, AsyncUnpack, unpack_async};
use tarstream::read::{ParseEvent, ParseOptions, list};
use tarstream::write::PackOptions;
use tarstream::{Error, UnpackOptions};

fn tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("a/x"), b"x").unwrap();
    fs::write(dir.path().join("a/y"), vec![b'y'; 3000]).unwrap();
    fs::write(dir.path().join("b"), b"bbb").unwrap();
    dir
}

fn paths(archive: &[u8]) -> Vec<String> {
    list(archive, ParseOptions::new())
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect()
}

#[tokio::test]
async fn test_async_pack_matches_queue_order() {
    let src = tree();
    let mut pack = AsyncPack::new(Vec::new(), PackOptions::new().cwd(src.path())).unwrap();
    pack.add("a").unwrap();
    pack.add("b").unwrap();
    let archive = pack.finish().await.unwrap();
    assert_eq!(paths(&archive), ["a/", "b", "a/x", "a/y"]);
    assert!(archive.ends_with(&[0u8; 1024]));
}

#[tokio::test]
async fn test_async_pack_then_sync_unpack() {
    let src = tree();
    let mut pack = AsyncPack::new(Vec::new(), PackOptions::new().cwd(src.path()).jobs(1)).unwrap();
    pack.add("a").unwrap();
    let archive = pack.finish().await.unwrap();

    let dst = tempfile::tempdir().unwrap();
    let result = tarstream::unpack(&archive[..], UnpackOptions::new(dst.path())).unwrap();
    assert_eq!(result.entries_extracted, 3);
    assert_eq!(fs::read(dst.path().join("a/y")).unwrap(), vec![b'y'; 3000]);
}

#[tokio::test]
async fn test_reader_events_and_entries() {
    let src = tree();
    let archive = common::pack(src.path(), &["a"], PackOptions::new());

    let mut reader = AsyncTarReader::new(&archive[..]);
    let mut found = Vec::new();
    while let Some((entry, body)) = reader.next_entry().await.unwrap() {
        found.push((entry.path, body.len()));
    }
    assert_eq!(
        found,
        [("a/".to_string(), 0), ("a/x".to_string(), 1), ("a/y".to_string(), 3000)]
    );

    let events: Vec<_> = AsyncTarReader::new(&archive[..])
        .into_stream()
        .map(|event| event.unwrap())
        .collect()
        .await;
    assert_eq!(events.last(), Some(&ParseEvent::End));
    assert!(events.contains(&ParseEvent::Eof));
}

#[tokio::test]
async fn test_stream_stops_after_error() {
    let mut bad = common::archive(&[common::file("damaged", b"x")]);
    bad[0] ^= 0x20;
    let options = ParseOptions::new().strict(true);
    let results: Vec<_> = AsyncTarReader::with_options(&bad[..], options)
        .into_stream()
        .collect()
        .await;
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::Warning(_))));
}

#[tokio::test]
async fn test_unpack_async_extracts() {
    let src = tree();
    let archive = common::pack(src.path(), &["a", "b"], PackOptions::new());
    let dst = tempfile::tempdir().unwrap();
    let result = unpack_async(&archive[..], UnpackOptions::new(dst.path())).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(result.entries_extracted, 4);
    assert_eq!(fs::read(dst.path().join("b")).unwrap(), b"bbb");
}

#[tokio::test]
async fn test_async_unpack_in_small_chunks() {
    let src = tree();
    let archive = common::pack(src.path(), &["a"], PackOptions::new());
    let dst = tempfile::tempdir().unwrap();
    let mut unpack = AsyncUnpack::new(UnpackOptions::new(dst.path())).unwrap();
    for chunk in archive.chunks(100) {
        unpack.write(chunk).await.unwrap();
    }
    let result = unpack.finish().await.unwrap();
    assert_eq!(result.bytes_written, 3001);
    assert_eq!(fs::read(dst.path().join("a/x")).unwrap(), b"x");
}

#[tokio::test]
async fn test_async_unpack_reports_strict_failure() {
    let data = common::archive(&[common::file("../escape", b"x")]);
    let dst = tempfile::tempdir().unwrap();
    let err = unpack_async(&data[..], UnpackOptions::new(dst.path()).strict(true))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Warning(ref w) if w.message == "path contains '..'"));
}
