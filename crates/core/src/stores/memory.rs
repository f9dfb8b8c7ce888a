use crate::embeddings::inner_product;
use crate::error::SearchError;
use crate::models::{IndexedPassage, ScoredPassage};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug)]
struct LocalCollection {
    dimension: usize,
    rows: Vec<IndexedPassage>,
}

#[derive(Serialize)]
struct SnapshotHeader {
    dimension: usize,
}

/// In-process vector store with exact inner-product search.
///
/// When built with [`LocalIndex::fresh`], every collection is mirrored to
/// `<dir>/<collection>.jsonl`: a `{"dimension":N}` header line followed by
/// one line per passage, appended as passages arrive. Rows only become
/// searchable once their lines are written. The directory only lives for
/// one process: it is wiped on the next start.
#[derive(Debug, Default)]
pub struct LocalIndex {
    collections: RwLock<HashMap<String, LocalCollection>>,
    persist_dir: Option<PathBuf>,
}

impl LocalIndex {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Deletes whatever file or directory sits at `path` and starts an empty store there.
    pub async fn fresh(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref();
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => {
                tokio::fs::remove_dir_all(path).await?;
                info!(path = %path.display(), "deleted old vector store directory");
            }
            Ok(_) => {
                tokio::fs::remove_file(path).await?;
                info!(path = %path.display(), "deleted old vector store file");
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        tokio::fs::create_dir_all(path).await?;

        Ok(Self {
            collections: RwLock::default(),
            persist_dir: Some(path.to_path_buf()),
        })
    }

    fn snapshot_path(&self, name: &str) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{name}.jsonl")))
    }

    async fn start_snapshot(&self, name: &str, dimension: usize) -> Result<(), SearchError> {
        if let Some(path) = self.snapshot_path(name) {
            let mut encoded = serde_json::to_vec(&SnapshotHeader { dimension })?;
            encoded.push(b'\n');
            tokio::fs::write(path, encoded).await?;
        }
        Ok(())
    }

    /// Appends to an existing snapshot; a missing file is an error.
    async fn append_snapshot(
        &self,
        name: &str,
        passages: &[IndexedPassage],
    ) -> Result<(), SearchError> {
        let Some(path) = self.snapshot_path(name) else {
            return Ok(());
        };
        let mut encoded = Vec::new();
        for passage in passages {
            serde_json::to_writer(&mut encoded, passage)?;
            encoded.push(b'\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await?;
        file.write_all(&encoded).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn has_collection(&self, name: &str) -> Result<bool, SearchError> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), SearchError> {
        let mut collections = self.collections.write().await;
        self.start_snapshot(name, dimension).await?;
        collections.insert(
            name.to_string(),
            LocalCollection {
                dimension,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, SearchError> {
        let mut collections = self.collections.write().await;
        let existed = collections.remove(name).is_some();
        if let Some(path) = self.snapshot_path(name) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(existed)
    }

    async fn row_count(&self, name: &str) -> Result<u64, SearchError> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|collection| collection.rows.len() as u64)
            .ok_or_else(|| SearchError::CollectionMissing(name.to_string()))
    }

    async fn insert(&self, name: &str, passages: &[IndexedPassage]) -> Result<(), SearchError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| SearchError::CollectionMissing(name.to_string()))?;

        for passage in passages {
            if passage.vector.len() != collection.dimension {
                return Err(SearchError::DimensionMismatch {
                    expected: collection.dimension,
                    actual: passage.vector.len(),
                });
            }
            let duplicate = collection.rows.iter().any(|row| row.id == passage.id)
                || passages
                    .iter()
                    .filter(|other| other.id == passage.id)
                    .count()
                    > 1;
            if duplicate {
                return Err(SearchError::Request(format!(
                    "passage id {} already exists in {name}",
                    passage.id
                )));
            }
        }

        self.append_snapshot(name, passages).await?;
        collection.rows.extend_from_slice(passages);
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPassage>, SearchError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| SearchError::CollectionMissing(name.to_string()))?;

        if query_vector.len() != collection.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: collection.dimension,
                actual: query_vector.len(),
            });
        }

        let mut hits: Vec<ScoredPassage> = collection
            .rows
            .iter()
            .map(|row| ScoredPassage {
                id: row.id,
                text: row.text.clone(),
                score: inner_product(query_vector, &row.vector),
            })
            .collect();

        // stable: equal scores keep insertion order
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(limit);
        Ok(hits)
    }
}
