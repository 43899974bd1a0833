//! Get command: submit one download and follow it to the end.

use anyhow::{Context, Result};
use chunkdl_core::config::ChunkdlConfig;
use chunkdl_core::naming::dest_name_for;
use chunkdl_core::transport::{probe, HeadResult};
use chunkdl_core::{ChannelListener, DownloadEvent, DownloadRequest, Downloader, TaskSnapshot};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GetArgs {
    pub url: String,
    pub checksum: String,
    pub length: Option<u64>,
    pub dir: Option<PathBuf>,
    pub name: Option<String>,
    pub segment_size: Option<u64>,
    pub json: bool,
}

/// One JSON output line: the event plus progress when the task is still registered.
#[derive(Debug, Serialize)]
struct EventLine<'a> {
    #[serde(flatten)]
    event: &'a DownloadEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    accumulated: Option<u64>,
    total: u64,
}

/// Run the download. Returns exit code 0 on success, 1 on failure, 130 on Ctrl-C.
pub async fn run_get(cfg: &ChunkdlConfig, args: GetArgs) -> Result<i32> {
    let head = if args.length.is_none() || args.name.is_none() {
        let url = args.url.clone();
        let curl = cfg.curl;
        let result = tokio::task::spawn_blocking(move || probe(&url, &curl)).await?;
        match (result, args.length) {
            (Ok(head), _) => Some(head),
            (Err(e), None) => return Err(e.context("HEAD probe failed; pass --length")),
            (Err(e), Some(_)) => {
                tracing::debug!("HEAD probe failed, naming from URL: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let total = match args.length {
        Some(n) => n,
        None => head
            .as_ref()
            .and_then(|h| h.content_length)
            .context("server did not report Content-Length; pass --length")?,
    };
    let name = args.name.clone().unwrap_or_else(|| {
        dest_name_for(
            &args.url,
            head.as_ref().and_then(|h: &HeadResult| h.content_disposition.as_deref()),
        )
    });
    let dir = match &args.dir {
        Some(d) => d.clone(),
        None => std::env::current_dir().context("current directory")?,
    };

    let mut cfg = cfg.clone();
    if let Some(size) = args.segment_size {
        cfg.max_segment_size = size;
    }
    let downloader = Downloader::from_config(&cfg).context("start downloader")?;
    let (listener, mut events) = ChannelListener::new();
    downloader.set_listener(Arc::new(listener));

    let request = DownloadRequest::new(args.url.as_str(), args.checksum.as_str(), total, &dir, name.as_str());
    let task_id = downloader.submit(request)?;
    if !args.json {
        println!("downloading {} -> {} ({} bytes, task {})", args.url, dir.join(&name).display(), total, task_id);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break None };
                let snapshot = downloader.progress(&args.url);
                print_event(&event, snapshot.as_ref(), total, args.json)?;
                if event.is_terminal() {
                    break Some(event);
                }
            }
            _ = &mut ctrl_c => {
                downloader.cancel(&args.url);
                eprintln!("interrupted; download cancelled");
                break None;
            }
        }
    };

    tokio::task::spawn_blocking(move || downloader.shutdown()).await?;

    Ok(match outcome {
        Some(DownloadEvent::TaskComplete { .. }) => 0,
        Some(_) => 1,
        None => 130,
    })
}

fn print_event(event: &DownloadEvent, snapshot: Option<&TaskSnapshot>, total: u64, json: bool) -> Result<()> {
    if json {
        let line = EventLine {
            event,
            accumulated: snapshot.map(|s| s.accumulated),
            total,
        };
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }
    match event {
        DownloadEvent::ChunkComplete { .. } => {
            if let Some(s) = snapshot {
                println!("{:>6.1}%  {}/{} bytes", s.fraction() * 100.0, s.accumulated, s.total_length);
            }
        }
        DownloadEvent::TaskComplete { url } => println!("complete: {}", url),
        DownloadEvent::Failure { message, .. } => eprintln!("failed: {}", message),
    }
    Ok(())
}
