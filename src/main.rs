// src/main.rs

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use filedex::{App, ScanEvent, SearchCriteria, StorageConfig};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: filedex <command>
  scan <dir>                       index a directory (Ctrl-C cancels)
  search <text> [--mime <type>]... search indexed files by name or path
  show <id>                        print one file record
  history                          recent scans
  version                          print the version";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    if command == "version" {
        println!("filedex {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = StorageConfig::from_env();
    let (tx, mut rx) = mpsc::unbounded_channel::<ScanEvent>();
    let app = Arc::new(App::bootstrap(&config, Arc::new(tx)).context("failed to open the index")?);

    // Events are printed as JSON lines, one per event.
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Unprintable event: {}", e),
            }
        }
    });

    let result = run(&app, command, &args[1..]).await;

    if let Err(e) = app.close() {
        tracing::warn!("Closing the index failed: {}", e);
    }
    drop(app);
    let _ = tokio::time::timeout(Duration::from_millis(500), printer).await;

    result
}

async fn run(app: &Arc<App>, command: &str, rest: &[String]) -> Result<()> {
    match command {
        "scan" => {
            let Some(dir) = rest.first() else { bail!("scan needs a directory\n{USAGE}") };
            let Some(dir) = app.select_directory(Some(&PathBuf::from(dir))) else {
                bail!("not a directory: {dir}");
            };

            let canceller = tokio::spawn({
                let app = Arc::clone(app);
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("Interrupt received, cancelling");
                        app.cancel_scan();
                    }
                }
            });

            let outcome = app.scan_directory(&dir).await;
            canceller.abort();
            let _ = canceller.await;

            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        "search" => {
            let mut criteria = SearchCriteria { limit: Some(100), ..Default::default() };
            let mut mime_types = Vec::new();
            let mut words = Vec::new();
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                if arg == "--mime" {
                    let Some(mime) = iter.next() else { bail!("--mime needs a value") };
                    mime_types.push(mime.clone());
                } else {
                    words.push(arg.as_str());
                }
            }
            if !words.is_empty() {
                criteria.text = Some(words.join(" "));
            }
            if !mime_types.is_empty() {
                criteria.mime_types = Some(mime_types);
            }

            let files = app.search_files(&criteria).map_err(anyhow::Error::msg)?;
            for file in &files {
                println!("{file}");
            }
            tracing::info!("{} files matched", files.len());
        }
        "show" => {
            let id: i64 = rest.first().context("show needs a file id")?.parse().context("file id must be a number")?;
            match app.get_file_metadata(id).map_err(anyhow::Error::msg)? {
                Some(file) => println!("{}", serde_json::to_string_pretty(&file)?),
                None => bail!("no file with id {id}"),
            }
        }
        "history" => {
            for entry in app.get_scan_history().map_err(anyhow::Error::msg)? {
                println!(
                    "#{} {} {} files={} started={}",
                    entry.id, entry.status, entry.directory, entry.files_scanned, entry.started_at
                );
            }
        }
        other => bail!("unknown command: {other}\n{USAGE}"),
    }

    Ok(())
}
