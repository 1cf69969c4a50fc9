// FILE: src/engine/orchestrator.rs
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::engine::events::{EventSink, ScanEvent};
use crate::engine::scanner::FileScanner;
use crate::error::{IndexError, Result};
use crate::state::ScanRegistry;
use crate::storage::{
    now_millis, FileRepository, ScanHistoryRepository, ScanHistoryUpdate, ScanStatus, StorageService,
};

/// Only every Nth file (and the last one) produces a progress event.
pub const PROGRESS_EVERY: usize = 10;

/// Terminal result of a scan as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub success: bool,
    pub scan_id: u64,
    pub files_found: usize,
    /// Milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs a blocking storage or filesystem job off the async workers.
async fn blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| IndexError::State(format!("background task failed: {e}")))?
}

/// Coordinates scans: identities, cancellation, persistence, history and events.
///
/// Lifecycle per scan: running -> completed | cancelled | failed.
/// Partial results of cancelled or failed scans are never persisted.
pub struct ScanOrchestrator {
    files: FileRepository,
    history: ScanHistoryRepository,
    scanner: FileScanner,
    registry: ScanRegistry,
    events: Arc<dyn EventSink>,
}

impl ScanOrchestrator {
    pub fn new(storage: Arc<StorageService>, events: Arc<dyn EventSink>) -> Self {
        Self {
            files: FileRepository::new(storage.clone()),
            history: ScanHistoryRepository::new(storage),
            scanner: FileScanner::new(),
            registry: ScanRegistry::new(),
            events,
        }
    }

    pub fn with_scanner(mut self, scanner: FileScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub async fn scan_directory(&self, directory: impl AsRef<Path>) -> ScanOutcome {
        let root = directory.as_ref().to_path_buf();
        let dir = root.to_string_lossy().to_string();
        let (scan_id, token) = self.registry.register(&dir);
        let processed = Arc::new(AtomicUsize::new(0));

        let history_id = {
            let history = self.history.clone();
            let dir = dir.clone();
            match blocking(move || history.create(&dir)).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!("[Orchestrator] Scan {} could not be recorded: {}", scan_id, e);
                    let duration_ms = self.release(scan_id);
                    return self.fail(scan_id, duration_ms, &e);
                }
            }
        };

        tracing::info!("[Orchestrator] Scan {} started: {}", scan_id, dir);
        self.events.emit(ScanEvent::ScanStarted { scan_id, directory: dir.clone() });

        let scanned = {
            let scanner = self.scanner.clone();
            let events = Arc::clone(&self.events);
            let token = token.clone();
            let processed = Arc::clone(&processed);
            blocking(move || {
                scanner.scan(&root, &token, |current, total, name| {
                    processed.store(current, Ordering::Relaxed);
                    if current % PROGRESS_EVERY == 0 || current == total {
                        events.emit(ScanEvent::ScanProgress {
                            scan_id,
                            current,
                            total,
                            current_file: name.to_string(),
                        });
                    }
                })
            })
            .await
        };

        let persisted = match scanned {
            // Cancellation that lands after the last file still discards the batch.
            Ok(_) if token.is_cancelled() => Err(IndexError::Cancelled),
            Ok(descriptors) => {
                let files = self.files.clone();
                let count = descriptors.len();
                blocking(move || files.batch_insert(&descriptors)).await.map(|_| count)
            }
            Err(e) => Err(e),
        };

        let duration_ms = self.release(scan_id);
        let processed = processed.load(Ordering::Relaxed);

        match persisted {
            Ok(files_found) => {
                self.finish_history(history_id, ScanStatus::Completed, files_found as u64).await;
                tracing::info!(
                    "[Orchestrator] Scan {} completed: {} files in {}ms",
                    scan_id,
                    files_found,
                    duration_ms
                );
                self.events.emit(ScanEvent::ScanCompleted { scan_id, files_found, duration_ms });
                ScanOutcome { success: true, scan_id, files_found, duration_ms, cancelled: false, error: None }
            }
            Err(e) if e.is_cancelled() => {
                self.finish_history(history_id, ScanStatus::Cancelled, processed as u64).await;
                tracing::info!("[Orchestrator] Scan {} cancelled after {} files", scan_id, processed);
                self.events.emit(ScanEvent::ScanCancelled { scan_id });
                ScanOutcome {
                    success: false,
                    scan_id,
                    files_found: 0,
                    duration_ms,
                    cancelled: true,
                    error: Some(e.sanitized()),
                }
            }
            Err(e) => {
                tracing::error!("[Orchestrator] Scan {} failed: {}", scan_id, e);
                self.finish_history(history_id, ScanStatus::Failed, processed as u64).await;
                self.fail(scan_id, duration_ms, &e)
            }
        }
    }

    /// Drops the scan from the registry and returns how long it ran.
    fn release(&self, scan_id: u64) -> u64 {
        self.registry.finish(scan_id).map(|scan| scan.elapsed_ms()).unwrap_or_default()
    }

    fn fail(&self, scan_id: u64, duration_ms: u64, error: &IndexError) -> ScanOutcome {
        let message = error.sanitized();
        self.events.emit(ScanEvent::ScanError { scan_id, error: message.clone() });
        ScanOutcome {
            success: false,
            scan_id,
            files_found: 0,
            duration_ms,
            cancelled: false,
            error: Some(message),
        }
    }

    async fn finish_history(&self, history_id: i64, status: ScanStatus, files_scanned: u64) {
        let history = self.history.clone();
        let update = ScanHistoryUpdate::finish(status, files_scanned, now_millis());
        if let Err(e) = blocking(move || history.update(history_id, &update)).await {
            tracing::error!("[Orchestrator] Could not mark history {} as {}: {}", history_id, status, e);
        }
    }

    /// Signals one scan. Returns false when no such scan is running.
    pub fn cancel(&self, scan_id: u64) -> bool {
        let found = self.registry.cancel(scan_id);
        if found {
            tracing::info!("[Orchestrator] Cancellation requested for scan {}", scan_id);
        }
        found
    }

    pub fn cancel_all(&self) -> usize {
        let count = self.registry.cancel_all();
        if count > 0 {
            tracing::info!("[Orchestrator] Cancellation requested for {} scans", count);
        }
        count
    }

    pub fn active_scans(&self) -> Vec<u64> {
        self.registry.active_ids()
    }
}
