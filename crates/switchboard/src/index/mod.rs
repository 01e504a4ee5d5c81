//! On-disk vector index over document chunks.
//!
//! The index is a single `index.json` holding the chunk texts, their source
//! metadata and one embedding per chunk. Search is brute-force cosine
//! similarity, which is plenty for a local document folder.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::embeddings::Embedder;
use crate::providers::errors::ProviderError;

pub const INDEX_FILE: &str = "index.json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index missing in {}. Build it with: switchboard ingest --docs data/docs --index {}", .0.display(), .0.display())]
    Missing(PathBuf),

    #[error("Index at {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source: String,
}

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub text: String,
    pub meta: ChunkMeta,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    pub dimension: usize,
    pub texts: Vec<String>,
    pub meta: Vec<ChunkMeta>,
    pub vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn add(
        &mut self,
        text: String,
        meta: ChunkMeta,
        vector: Vec<f32>,
    ) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.texts.push(text);
        self.meta.push(meta);
        self.vectors.push(vector);
        Ok(())
    }

    /// Top `k` chunks by cosine similarity, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scores: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);

        Ok(scores
            .into_iter()
            .map(|(i, score)| Hit {
                text: self.texts[i].clone(),
                meta: self.meta[i].clone(),
                score,
            })
            .collect())
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = Self::path_in(dir);
        if !path.is_file() {
            return Err(IndexError::Missing(dir.to_path_buf()));
        }
        let raw = fs::read_to_string(&path)?;
        let index: VectorIndex =
            serde_json::from_str(&raw).map_err(|e| IndexError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let consistent = index.meta.len() == index.texts.len()
            && index.vectors.len() == index.texts.len()
            && index.vectors.iter().all(|v| v.len() == index.dimension);
        if !consistent {
            return Err(IndexError::Corrupt {
                path,
                reason: "texts, metadata and vectors disagree".to_string(),
            });
        }
        Ok(index)
    }

    /// [`VectorIndex::load`] on the blocking pool, so reading and parsing a
    /// large index does not stall an async worker
    pub async fn load_async(dir: PathBuf) -> Result<Self, IndexError> {
        tokio::task::spawn_blocking(move || Self::load(&dir))
            .await
            .map_err(|e| IndexError::Io(std::io::Error::other(e)))?
    }

    /// Write the index to `dir`, replacing any previous one atomically:
    /// readers see either the old file or the new one, never a partial write.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, IndexError> {
        fs::create_dir_all(dir)?;
        let path = Self::path_in(dir);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, self).map_err(std::io::Error::from)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Anything that can return the chunks most relevant to a question
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Hit>, IndexError>;
}

/// A [`VectorIndex`] on disk queried through an [`Embedder`].
///
/// The file is read on every search so a rebuilt index is picked up without
/// restarting, and nothing is shared mutably between concurrent requests.
pub struct EmbeddedIndex {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddedIndex {
    pub fn new(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dir: dir.into(),
            embedder,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DocumentIndex for EmbeddedIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Hit>, IndexError> {
        let index = VectorIndex::load_async(self.dir.clone()).await?;
        if index.is_empty() {
            return Ok(vec![]);
        }
        let vector = self.embedder.embed_single(query.to_string()).await?;
        index.search(&vector, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("refund") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    fn meta(source: &str) -> ChunkMeta {
        ChunkMeta {
            source: source.to_string(),
        }
    }

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new(2);
        index
            .add("Refunds within 30 days.".to_string(), meta("policy.md"), vec![1.0, 0.1])
            .unwrap();
        index
            .add("Shipping takes a week.".to_string(), meta("shipping.md"), vec![0.1, 1.0])
            .unwrap();
        index
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let hits = sample().search(&[0.0, 1.0], 4).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].meta.source, "shipping.md");
        assert!(hits[0].score > hits[1].score);

        let top = sample().search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(top[0].text, "Refunds within 30 days.");
    }

    #[test]
    fn test_dimension_checks() {
        let mut index = VectorIndex::new(3);
        assert!(matches!(
            index.add("x".to_string(), meta("a"), vec![1.0]),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(matches!(
            sample().search(&[1.0, 0.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = sample().save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(INDEX_FILE));
        assert_eq!(VectorIndex::load(dir.path()).unwrap(), sample());

        // a second save replaces the first
        VectorIndex::new(2).save(dir.path()).unwrap();
        assert!(VectorIndex::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_index_message() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nowhere");
        let err = VectorIndex::load(&missing).unwrap_err();
        assert!(matches!(err, IndexError::Missing(_)));
        let message = err.to_string();
        assert!(message.starts_with(&format!("Index missing in {}.", missing.display())));
        assert!(message.contains("switchboard ingest"));
    }

    #[test]
    fn test_corrupt_index() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "{not json").unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path()),
            Err(IndexError::Corrupt { .. })
        ));

        fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"dimension": 2, "texts": ["a"], "meta": [], "vectors": [[1.0, 0.0]]}"#,
        )
        .unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path()),
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_embedded_index_search() {
        let dir = TempDir::new().unwrap();
        sample().save(dir.path()).unwrap();
        let index = EmbeddedIndex::new(dir.path(), Arc::new(AxisEmbedder));

        let hits = index.search("what is the refund policy", 1).await.unwrap();
        assert_eq!(hits[0].meta.source, "policy.md");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_load_async_matches_load() {
        let dir = TempDir::new().unwrap();
        sample().save(dir.path()).unwrap();
        let loaded = VectorIndex::load_async(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(loaded, sample());

        let missing = dir.path().join("nowhere");
        assert!(matches!(
            VectorIndex::load_async(missing).await,
            Err(IndexError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_embedded_index_missing_is_reported() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddedIndex::new(dir.path().join("nowhere"), Arc::new(AxisEmbedder));
        assert!(matches!(
            index.search("refund", 1).await,
            Err(IndexError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_embedded_index_empty_skips_embedding() {
        let dir = TempDir::new().unwrap();
        VectorIndex::new(2).save(dir.path()).unwrap();
        let index = EmbeddedIndex::new(dir.path(), Arc::new(AxisEmbedder));
        assert!(index.search("anything", 4).await.unwrap().is_empty());
    }
}
