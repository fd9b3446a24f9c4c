//! Resident similarity index over embedded reference passages.
//!
//! The index is a single JSON file holding every passage with its
//! L2-normalized embedding. Search is an exhaustive cosine scan, which is
//! plenty for a book-sized corpus.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IndexError;
use crate::llm::embeddings::EmbeddingClient;

pub mod chunking;
pub mod source;

pub use chunking::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use source::read_source;

pub const INDEX_FILE: &str = "medical_index.json";
const EMBED_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    content: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    model: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub content: String,
    pub score: f32,
}

pub fn index_path(index_dir: &Path) -> PathBuf {
    index_dir.join(INDEX_FILE)
}

impl VectorIndex {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            entries: Vec::new(),
        }
    }

    pub fn load(index_dir: &Path) -> Result<Self, IndexError> {
        let path = index_path(index_dir);
        if !path.exists() {
            return Err(IndexError::NotFound(path));
        }
        let data = std::fs::read_to_string(&path)?;
        let index: VectorIndex = serde_json::from_str(&data)?;
        info!(
            "Loaded index from {} with {} documents",
            path.display(),
            index.len()
        );
        Ok(index)
    }

    pub fn save(&self, index_dir: &Path) -> Result<PathBuf, IndexError> {
        std::fs::create_dir_all(index_dir)?;
        let path = index_path(index_dir);
        let data = serde_json::to_string(self)?;
        std::fs::write(&path, data)?;
        Ok(path)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, content: String, mut embedding: Vec<f32>) -> Result<(), IndexError> {
        if embedding.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        normalize(&mut embedding);
        self.entries.push(IndexEntry { content, embedding });
        Ok(())
    }

    /// Best `limit` passages for `query`, highest cosine similarity first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<IndexHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (dot(&query, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, e)| IndexHit {
                content: e.content.clone(),
                score,
            })
            .collect())
    }
}

/// Load the index from `index_dir`, or build it from `text` if absent.
///
/// With `force_rebuild` an existing index is ignored and overwritten.
pub async fn build_from_text(
    text: &str,
    index_dir: &Path,
    embedder: &EmbeddingClient,
    force_rebuild: bool,
) -> Result<VectorIndex, IndexError> {
    if !force_rebuild {
        match VectorIndex::load(index_dir) {
            Ok(existing) => {
                info!("Using existing index ({} documents)", existing.len());
                return Ok(existing);
            }
            Err(IndexError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let chunks = chunk_text(text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
    info!("Split source text into {} chunks", chunks.len());

    let mut index: Option<VectorIndex> = None;
    for (batch_no, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
        let embeddings = embedder
            .embed(batch)
            .await
            .map_err(|e| IndexError::Embedding(format!("{e:#}")))?;

        for (content, embedding) in batch.iter().zip(embeddings) {
            let target = index
                .get_or_insert_with(|| VectorIndex::new(embedder.model(), embedding.len()));
            target.add(content.clone(), embedding)?;
        }
        info!(
            "Embedded batch {} ({} chunks)",
            batch_no + 1,
            batch.len()
        );
    }

    let index = index.unwrap_or_else(|| VectorIndex::new(embedder.model(), 0));
    let path = index.save(index_dir)?;
    info!("Index saved to {} with {} documents", path.display(), index.len());
    Ok(index)
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new("test-model", 3);
        index
            .add("Insulin lowers blood glucose.".into(), vec![1.0, 0.0, 0.0])
            .unwrap();
        index
            .add("Asthma narrows the airways.".into(), vec![0.0, 2.0, 0.0])
            .unwrap();
        index
            .add("Metformin is a first-line diabetes drug.".into(), vec![0.8, 0.1, 0.0])
            .unwrap();
        index
    }

    #[test]
    fn search_orders_by_similarity() {
        let hits = sample_index().search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Insulin lowers blood glucose.");
        assert_eq!(hits[1].content, "Metformin is a first-line diabetes drug.");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_with_large_limit_returns_everything() {
        let hits = sample_index().search(&[0.0, 1.0, 0.0], 20).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].content, "Asthma narrows the airways.");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = sample_index();
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(index.add("x".into(), vec![1.0]).is_err());
    }

    #[test]
    fn save_and_load_preserve_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index();
        let path = index.save(dir.path()).unwrap();
        assert!(path.ends_with(INDEX_FILE));

        let loaded = VectorIndex::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.dimension(), 3);
    }

    #[test]
    fn load_missing_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path()),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn load_corrupt_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(index_path(dir.path()), "{not json").unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path()),
            Err(IndexError::Corrupt(_))
        ));
    }

    /// Embeds each passage as `[1.0, passage number]`.
    struct NumberingEmbedder;

    impl Respond for NumberingEmbedder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let embeddings: Vec<Vec<f32>> = body["texts"]
                .as_array()
                .unwrap()
                .iter()
                .map(|text| {
                    let n: f32 = text
                        .as_str()
                        .unwrap()
                        .split_whitespace()
                        .find_map(|word| word.trim_end_matches('.').parse().ok())
                        .unwrap_or(0.0);
                    vec![1.0, n]
                })
                .collect();
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embeddings": embeddings }))
        }
    }

    fn long_text() -> String {
        (0..1500)
            .map(|i| format!("Passage {i} covers a common laboratory finding."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn build_embeds_in_batches_and_saves() {
        let text = long_text();
        let chunk_count = chunk_text(&text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP).len();
        assert!(chunk_count > EMBED_BATCH_SIZE);
        let batches = chunk_count.div_ceil(EMBED_BATCH_SIZE);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(NumberingEmbedder)
            .expect(batches as u64)
            .mount(&server)
            .await;

        let embedder = EmbeddingClient::new(
            reqwest::Client::new(),
            server.uri(),
            "test-model".to_string(),
        );
        let dir = tempfile::tempdir().unwrap();
        let built = build_from_text(&text, dir.path(), &embedder, false)
            .await
            .unwrap();
        assert_eq!(built.len(), chunk_count);
        assert_eq!(built.dimension(), 2);
        assert_eq!(built.model(), "test-model");

        let requests = server.received_requests().await.unwrap();
        let sizes: Vec<usize> = requests
            .iter()
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                body["texts"].as_array().unwrap().len()
            })
            .collect();
        assert!(sizes.iter().all(|&n| n <= EMBED_BATCH_SIZE));
        assert_eq!(sizes.iter().sum::<usize>(), chunk_count);

        let loaded = VectorIndex::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), chunk_count);
    }

    #[tokio::test]
    async fn force_rebuild_replaces_existing_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(NumberingEmbedder)
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        sample_index().save(dir.path()).unwrap();
        let embedder = EmbeddingClient::new(
            reqwest::Client::new(),
            server.uri(),
            "test-model".to_string(),
        );
        let built = build_from_text("Passage 7 is short.", dir.path(), &embedder, true)
            .await
            .unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built.dimension(), 2);
        assert_eq!(VectorIndex::load(dir.path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn build_reuses_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        sample_index().save(dir.path()).unwrap();
        // Unreachable service: reuse must not call it.
        let embedder = EmbeddingClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9".to_string(),
            "test-model".to_string(),
        );
        let index = build_from_text("ignored", dir.path(), &embedder, false)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);
    }
}
