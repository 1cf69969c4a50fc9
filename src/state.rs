// FILE: src/state.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Bookkeeping for one in-flight scan.
#[derive(Debug, Clone)]
pub struct ActiveScan {
    pub directory: String,
    pub token: CancellationToken,
    pub started_at: Instant,
}

impl ActiveScan {
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// In-memory registry of running scans, owned by the orchestrator.
///
/// Identities are handed out monotonically and never reused within a process.
#[derive(Debug)]
pub struct ScanRegistry {
    scans: DashMap<u64, ActiveScan>,
    next_id: AtomicU64,
}

impl Default for ScanRegistry {
    fn default() -> Self {
        Self {
            scans: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a scan identity with a fresh cancellation token.
    pub fn register(&self, directory: &str) -> (u64, CancellationToken) {
        let scan_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        self.scans.insert(
            scan_id,
            ActiveScan {
                directory: directory.to_string(),
                token: token.clone(),
                started_at: Instant::now(),
            },
        );
        (scan_id, token)
    }

    pub fn cancel(&self, scan_id: u64) -> bool {
        match self.scans.get(&scan_id) {
            Some(scan) => {
                scan.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signals every active scan. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for scan in self.scans.iter() {
            scan.token.cancel();
            count += 1;
        }
        count
    }

    /// Removes a scan on its terminal transition.
    pub fn finish(&self, scan_id: u64) -> Option<ActiveScan> {
        self.scans.remove(&scan_id).map(|(_, scan)| scan)
    }

    pub fn active_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.scans.iter().map(|s| *s.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}
