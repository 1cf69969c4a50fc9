// FILE: src/engine/searcher.rs
use crate::error::Result;
use crate::storage::{FileRepository, SimilarityHit};

pub struct Searcher;

impl Searcher {
    /// Attach file records to similarity hits, keeping the distance order.
    /// Hits whose file row no longer exists are dropped.
    pub fn hydrate(files: &FileRepository, hits: Vec<SimilarityHit>) -> Result<Vec<SimilarityHit>> {
        let total = hits.len();
        let mut hydrated = Vec::with_capacity(total);

        for mut hit in hits {
            match files.find_by_id(hit.file_id)? {
                Some(record) => {
                    hit.file = Some(record);
                    hydrated.push(hit);
                }
                None => tracing::debug!("[Searcher] Embedding for missing file {} ignored", hit.file_id),
            }
        }

        if hydrated.len() < total {
            tracing::warn!("[Searcher] {} of {} hits had no file record", total - hydrated.len(), total);
        }
        Ok(hydrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::config::StorageConfig;
    use crate::storage::{FileDescriptor, Modality, StorageService};
    use tempfile::tempdir;

    fn descriptor(path: &str) -> FileDescriptor {
        FileDescriptor {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            size: 1,
            mime_type: "text/plain".to_string(),
            created_at: 1,
            modified_at: 1,
            hashes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_hydrate_drops_orphans_and_keeps_order() {
        let dir = tempdir().unwrap();
        let storage =
            StorageService::open(&StorageConfig::with_db_path(dir.path().join("index.db")).without_vectors()).unwrap();
        let files = FileRepository::new(storage);
        let a = files.insert(&descriptor("/x/a.txt")).unwrap();
        let b = files.insert(&descriptor("/x/b.txt")).unwrap();

        let hits = vec![
            SimilarityHit { file_id: b, distance: 0.1, modality: Modality::Text, file: None },
            SimilarityHit { file_id: 999, distance: 0.2, modality: Modality::Text, file: None },
            SimilarityHit { file_id: a, distance: 0.3, modality: Modality::Image, file: None },
        ];

        let hydrated = Searcher::hydrate(&files, hits).unwrap();
        assert_eq!(hydrated.len(), 2);
        assert_eq!(hydrated[0].file.as_ref().unwrap().path, "/x/b.txt");
        assert_eq!(hydrated[1].file.as_ref().unwrap().path, "/x/a.txt");
    }
}
