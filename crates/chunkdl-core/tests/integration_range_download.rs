//! Integration test: local HTTP server with Range support, multi-chunk download
//! through the curl transport and worker pool.
//!
//! Starts a minimal range-capable server, submits a download, and waits for
//! the terminal listener event.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chunkdl_core::checksum::sha256_path;
use chunkdl_core::config::{ChunkdlConfig, CurlConfig, FailurePolicy};
use chunkdl_core::transport::probe;
use chunkdl_core::{
    ChannelListener, DownloadEvent, DownloadRequest, Downloader, FailureKind, SubmitError,
};
use common::range_server::{self, RangeServerOptions};
use sha2::{Digest, Sha256};
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;

fn body(len: usize) -> Vec<u8> {
    (0u8..251).cycle().take(len).collect()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn test_config(segment: u64) -> ChunkdlConfig {
    ChunkdlConfig {
        max_segment_size: segment,
        workers: 4,
        curl: CurlConfig {
            connect_timeout_secs: 5,
            timeout_secs: 30,
            ..CurlConfig::default()
        },
        ..ChunkdlConfig::default()
    }
}

fn start_downloader(config: &ChunkdlConfig) -> (Downloader, UnboundedReceiver<DownloadEvent>) {
    let dl = Downloader::from_config(config).expect("downloader");
    let (listener, events) = ChannelListener::new();
    dl.set_listener(Arc::new(listener));
    (dl, events)
}

/// Collect events for `url` until its terminal one; returns (terminal, chunk events).
async fn wait_terminal(events: &mut UnboundedReceiver<DownloadEvent>, url: &str) -> (DownloadEvent, usize) {
    let mut chunks = 0;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for download")
            .expect("listener dropped");
        assert_eq!(event.url(), url);
        if event.is_terminal() {
            return (event, chunks);
        }
        chunks += 1;
    }
}

#[tokio::test]
async fn multi_chunk_download_completes_and_file_matches() {
    let data = body(64 * 1024 + 123);
    let server = range_server::start(data.clone());
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(4096));

    let req = DownloadRequest::new(&server.url, sha256_hex(&data), data.len() as u64, dir.path(), "out.bin");
    dl.submit(req).unwrap();

    let (terminal, chunks) = wait_terminal(&mut events, &server.url).await;
    assert_eq!(terminal, DownloadEvent::TaskComplete { url: server.url.clone() });
    assert_eq!(chunks, 17);
    assert_eq!(server.gets(), 17);

    let final_path = dir.path().join("out.bin");
    assert_eq!(std::fs::read(&final_path).unwrap(), data);
    assert_eq!(sha256_path(&final_path).unwrap(), sha256_hex(&data));
    assert!(!dir.path().join("out.bin.part").exists());
    assert!(!dir.path().join(".chunkdl").exists());
    assert_eq!(dl.active_tasks(), 0);
    dl.shutdown();
}

#[tokio::test]
async fn md5_checksum_is_accepted() {
    let data = body(10_000);
    let server = range_server::start(data.clone());
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(3000));

    let md5 = format!("md5:{:x}", md5::compute(&data));
    dl.submit(DownloadRequest::new(&server.url, md5, 10_000, dir.path(), "m.bin"))
        .unwrap();

    let (terminal, _) = wait_terminal(&mut events, &server.url).await;
    assert!(matches!(terminal, DownloadEvent::TaskComplete { .. }));
    assert_eq!(std::fs::read(dir.path().join("m.bin")).unwrap(), data);
    dl.shutdown();
}

#[tokio::test]
async fn failing_range_fails_task_once_and_cleans_up() {
    let data = body(20_000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            fail_at: Some(8192),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(4096));

    dl.submit(DownloadRequest::new(&server.url, sha256_hex(&data), 20_000, dir.path(), "f.bin"))
        .unwrap();

    let (terminal, _) = wait_terminal(&mut events, &server.url).await;
    match terminal {
        DownloadEvent::Failure { kind, message, .. } => {
            assert_eq!(kind, FailureKind::Transport);
            assert!(message.contains("HTTP 500"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    dl.shutdown();

    while let Ok(e) = events.try_recv() {
        assert!(!e.is_terminal(), "extra terminal event {e:?}");
    }
    assert!(!dir.path().join("f.bin").exists());
    assert!(!dir.path().join("f.bin.part").exists());
    assert!(!dir.path().join(".chunkdl").exists());
}

#[tokio::test]
async fn short_body_is_a_transport_failure() {
    let data = body(10_000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            short_at: Some(0),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(5000));

    dl.submit(DownloadRequest::new(&server.url, sha256_hex(&data), 10_000, dir.path(), "s.bin"))
        .unwrap();

    let (terminal, _) = wait_terminal(&mut events, &server.url).await;
    match terminal {
        DownloadEvent::Failure { kind, message, .. } => {
            assert_eq!(kind, FailureKind::Transport);
            assert!(message.contains("chunk 0"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    dl.shutdown();
}

#[tokio::test]
async fn server_ignoring_ranges_is_rejected() {
    let data = body(10_000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(4000));

    dl.submit(DownloadRequest::new(&server.url, sha256_hex(&data), 10_000, dir.path(), "r.bin"))
        .unwrap();

    let (terminal, _) = wait_terminal(&mut events, &server.url).await;
    assert!(matches!(
        terminal,
        DownloadEvent::Failure { kind: FailureKind::Transport, .. }
    ));
    assert!(!dir.path().join("r.bin").exists());
    dl.shutdown();
}

#[tokio::test]
async fn checksum_mismatch_reports_integrity_failure() {
    let data = body(9_000);
    let server = range_server::start(data.clone());
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(4096));

    dl.submit(DownloadRequest::new(&server.url, sha256_hex(b"other"), 9_000, dir.path(), "c.bin"))
        .unwrap();

    let (terminal, chunks) = wait_terminal(&mut events, &server.url).await;
    assert_eq!(chunks, 3);
    match terminal {
        DownloadEvent::Failure { kind, message, .. } => {
            assert_eq!(kind, FailureKind::IntegrityMismatch);
            assert!(message.contains(&sha256_hex(&data)), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!dir.path().join("c.bin").exists());
    assert!(!dir.path().join("c.bin.part").exists());
    dl.shutdown();
}

#[tokio::test]
async fn keep_siblings_policy_reports_failed_chunk_and_drops_task() {
    let data = body(12_000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            fail_at: Some(4000),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let config = ChunkdlConfig {
        failure_policy: FailurePolicy::KeepSiblings,
        ..test_config(4000)
    };
    let (dl, mut events) = start_downloader(&config);

    dl.submit(DownloadRequest::new(&server.url, sha256_hex(&data), 12_000, dir.path(), "k.bin"))
        .unwrap();

    let (terminal, _) = wait_terminal(&mut events, &server.url).await;
    assert!(matches!(
        terminal,
        DownloadEvent::Failure { kind: FailureKind::Transport, .. }
    ));
    dl.shutdown();

    let mut merged_after_failure = 0;
    while let Ok(e) = events.try_recv() {
        assert!(!e.is_terminal(), "extra terminal event {e:?}");
        merged_after_failure += 1;
    }
    assert!(merged_after_failure <= 2);
    assert!(!dir.path().join("k.bin").exists());
    assert!(!dir.path().join("k.bin.part").exists());
}

#[tokio::test]
async fn duplicate_submit_rejected_and_resubmit_after_completion_allowed() {
    let data = body(8_000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            delay: Duration::from_millis(200),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(4000));
    let req = DownloadRequest::new(&server.url, sha256_hex(&data), 8_000, dir.path(), "d.bin");

    let first = dl.submit(req.clone()).unwrap();
    assert_eq!(
        dl.submit(req.clone()),
        Err(SubmitError::DuplicateTask(server.url.clone()))
    );
    let snap = dl.progress(&server.url).expect("registered");
    assert_eq!(snap.id, first);
    assert_eq!(snap.chunk_count, 2);

    let (terminal, _) = wait_terminal(&mut events, &server.url).await;
    assert!(matches!(terminal, DownloadEvent::TaskComplete { .. }));

    let second = dl.submit(req).unwrap();
    assert_ne!(first, second);
    let (terminal, _) = wait_terminal(&mut events, &server.url).await;
    assert!(matches!(terminal, DownloadEvent::TaskComplete { .. }));
    assert_eq!(std::fs::read(dir.path().join("d.bin")).unwrap(), data);
    dl.shutdown();
}

#[tokio::test]
async fn cancel_in_flight_leaves_no_files() {
    let data = body(16_000);
    let server = range_server::start_with_options(
        data.clone(),
        RangeServerOptions {
            delay: Duration::from_millis(300),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let (dl, mut events) = start_downloader(&test_config(2000));

    dl.submit(DownloadRequest::new(&server.url, sha256_hex(&data), 16_000, dir.path(), "x.bin"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dl.cancel(&server.url));
    assert!(dl.progress(&server.url).is_none());
    dl.shutdown();

    while let Ok(e) = events.try_recv() {
        assert!(!e.is_terminal(), "cancelled task must not report {e:?}");
    }
    assert!(!dir.path().join("x.bin").exists());
    assert!(!dir.path().join("x.bin.part").exists());
    assert!(!dir.path().join(".chunkdl").exists());
}

#[test]
fn probe_reports_length_and_range_support() {
    let server = range_server::start(body(5_000));
    let head = probe(&server.url, &CurlConfig::default()).unwrap();
    assert_eq!(head.content_length, Some(5_000));
    assert!(head.accept_ranges);
    assert_eq!(head.etag.as_deref(), Some("test-etag"));
}
