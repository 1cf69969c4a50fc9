// FILE: src/storage/mod.rs
pub mod connection;
pub mod file_registry;
pub mod migrations;
pub mod scan_history;
pub mod vec_index;

// Common exports
pub use connection::StorageService;
pub use file_registry::FileRepository;
pub use scan_history::ScanHistoryRepository;
pub use vec_index::{Modality, SimilarityHit, VectorStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form per-file metadata, stored as a JSON object.
pub type FileMetadata = BTreeMap<String, serde_json::Value>;

/// A file as produced by the scanner, before it has a storage id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub hashes: Vec<String>,
    pub metadata: FileMetadata,
}

/// A persisted row of the `files` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub hashes: Vec<String>,
    pub metadata: FileMetadata,
    pub indexed_at: i64,
}

impl std::fmt::Display for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} ({}, {} bytes)", self.id, self.path, self.mime_type, self.size)
    }
}

/// Partial update for a file row. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdate {
    pub path: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub hashes: Option<Vec<String>>,
    pub metadata: Option<FileMetadata>,
}

impl FileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &FileUpdate::default()
    }
}

/// Structured filter for `FileRepository::search`. Every present criterion is ANDed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub mime_types: Option<Vec<String>>,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    /// Substring matched against name or path.
    pub text: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            "cancelled" => Ok(ScanStatus::Cancelled),
            other => Err(format!("unknown scan status: {other}")),
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `scan_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryEntry {
    pub id: i64,
    pub directory: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub files_scanned: u64,
    pub status: ScanStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanHistoryUpdate {
    pub completed_at: Option<i64>,
    pub files_scanned: Option<u64>,
    pub status: Option<ScanStatus>,
}

impl ScanHistoryUpdate {
    /// Terminal transition stamped with the given completion time.
    pub fn finish(status: ScanStatus, files_scanned: u64, completed_at: i64) -> Self {
        Self {
            completed_at: Some(completed_at),
            files_scanned: Some(files_scanned),
            status: Some(status),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &ScanHistoryUpdate::default()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_status_round_trips_through_text() {
        for status in [ScanStatus::Running, ScanStatus::Completed, ScanStatus::Failed, ScanStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<ScanStatus>().unwrap(), status);
        }
        assert!("paused".parse::<ScanStatus>().is_err());
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_empty_updates() {
        assert!(FileUpdate::default().is_empty());
        assert!(!FileUpdate { name: Some("x".into()), ..Default::default() }.is_empty());
        assert!(ScanHistoryUpdate::default().is_empty());
    }
}
