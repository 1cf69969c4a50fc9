//! Events pushed toward the presentation layer
//!
//! Emission is fire-and-forget: a sink must never block the scan loop.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ScanEvent {
    #[serde(rename_all = "camelCase")]
    ScanStarted { scan_id: u64, directory: String },

    #[serde(rename_all = "camelCase")]
    ScanProgress { scan_id: u64, current: usize, total: usize, current_file: String },

    #[serde(rename_all = "camelCase")]
    ScanCompleted {
        scan_id: u64,
        files_found: usize,
        #[serde(rename = "duration")]
        duration_ms: u64,
    },

    #[serde(rename_all = "camelCase")]
    ScanCancelled { scan_id: u64 },

    #[serde(rename_all = "camelCase")]
    ScanError { scan_id: u64, error: String },

    AppError { error: String },
}

impl ScanEvent {
    pub fn scan_id(&self) -> Option<u64> {
        match self {
            ScanEvent::ScanStarted { scan_id, .. }
            | ScanEvent::ScanProgress { scan_id, .. }
            | ScanEvent::ScanCompleted { scan_id, .. }
            | ScanEvent::ScanCancelled { scan_id }
            | ScanEvent::ScanError { scan_id, .. } => Some(*scan_id),
            ScanEvent::AppError { .. } => None,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

/// Unbounded sends never wait; a closed receiver just drops the event.
impl EventSink for mpsc::UnboundedSender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        if self.send(event).is_err() {
            tracing::debug!("[Events] Receiver gone, event dropped");
        }
    }
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ScanEvent) {}
}
