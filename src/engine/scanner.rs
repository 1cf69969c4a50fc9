// FILE: src/engine/scanner.rs
use std::fs;
use std::path::{Path, PathBuf};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use crate::classify::{mime_for_path, Bouncer};
use crate::error::{IndexError, Result};
use crate::storage::{FileDescriptor, FileMetadata};

/// Files larger than this are recorded without a content hash.
pub const DEFAULT_MAX_HASH_BYTES: u64 = 100 * 1024 * 1024;

/// Stateless directory scanner. Cheap to construct per scan.
#[derive(Debug, Clone)]
pub struct FileScanner {
    max_hash_bytes: u64,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self { max_hash_bytes: DEFAULT_MAX_HASH_BYTES }
    }
}

impl FileScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_hash_bytes(mut self, max_hash_bytes: u64) -> Self {
        self.max_hash_bytes = max_hash_bytes;
        self
    }

    /// Walks `root` depth-first and describes every regular file:
    /// 1. Validate the root (absolute, existing, readable directory)
    /// 2. Enumerate files, never entering skipped directories
    /// 3. Describe each file (MIME, timestamps, hash), reporting progress
    ///
    /// `cancel` is checked between files; once set the scan returns
    /// `IndexError::Cancelled`. A file that cannot be read is logged and left out.
    pub fn scan<F>(&self, root: &Path, cancel: &CancellationToken, mut on_progress: F) -> Result<Vec<FileDescriptor>>
    where
        F: FnMut(usize, usize, &str),
    {
        Self::validate_root(root)?;

        let paths = Self::enumerate(root, cancel)?;
        let total = paths.len();
        tracing::info!("[Scanner] {} files to process under {}", total, root.display());

        let mut descriptors = Vec::with_capacity(total);
        for (index, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("[Scanner] Cancelled after {} of {} files", index, total);
                return Err(IndexError::Cancelled);
            }

            match self.describe(path) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => tracing::warn!("[Scanner] Skipping {}: {}", path.display(), e),
            }

            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            on_progress(index + 1, total, &name);
        }

        Ok(descriptors)
    }

    fn validate_root(root: &Path) -> Result<()> {
        if !root.is_absolute() {
            return Err(IndexError::Path(format!("not an absolute path: {}", root.display())));
        }

        let metadata = fs::metadata(root)
            .map_err(|_| IndexError::Path(format!("does not exist: {}", root.display())))?;
        if !metadata.is_dir() {
            return Err(IndexError::Path(format!("not a directory: {}", root.display())));
        }

        fs::read_dir(root).map_err(|_| IndexError::Path(format!("not readable: {}", root.display())))?;
        Ok(())
    }

    /// Regular files under `root` in deterministic depth-first order.
    fn enumerate(root: &Path, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(entry.file_type().is_dir() && Bouncer::skip_dir(&entry.file_name().to_string_lossy()))
            });

        let mut paths = Vec::new();
        for entry in walker {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            match entry {
                Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => tracing::warn!("[Scanner] Cannot read entry: {}", e),
            }
        }

        Ok(paths)
    }

    /// Builds the descriptor for a single file.
    pub fn describe(&self, path: &Path) -> Result<FileDescriptor> {
        let metadata = fs::metadata(path)?;
        let size = metadata.len();

        let modified = metadata.modified()?;
        let created = metadata.created().unwrap_or(modified);

        let hashes = if size > self.max_hash_bytes {
            tracing::debug!("[Scanner] {} exceeds hash ceiling ({} bytes), not hashing", path.display(), size);
            Vec::new()
        } else {
            vec![hash_contents(&fs::read(path)?)]
        };

        let extension = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase());
        let mut extra = FileMetadata::new();
        extra.insert("extension".to_string(), serde_json::json!(extension));
        extra.insert(
            "parent".to_string(),
            serde_json::json!(path.parent().map(|p| p.to_string_lossy().to_string())),
        );
        extra.insert("readonly".to_string(), serde_json::json!(metadata.permissions().readonly()));

        Ok(FileDescriptor {
            path: path.to_string_lossy().to_string(),
            name: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            size,
            mime_type: mime_for_path(path).to_string(),
            created_at: chrono::DateTime::<chrono::Utc>::from(created).timestamp_millis(),
            modified_at: chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis(),
            hashes,
            metadata: extra,
        })
    }
}

/// SHA-256 tagged with its algorithm name.
fn hash_contents(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}
