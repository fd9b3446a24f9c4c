// In-process backend: embedding client plus the resident vector index

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{
    ready_message, RetrievalBackend, TopK, NOT_READY_MESSAGE, UNAVAILABLE_ADVISORY,
};
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::llm::EmbeddingClient;
use crate::models::{ReadinessStatus, RetrievalOutcome, RetrievalResult};

pub struct InProcessBackend {
    index: Result<Arc<VectorIndex>, String>,
    embedder: EmbeddingClient,
}

impl InProcessBackend {
    pub fn new(index: VectorIndex, embedder: EmbeddingClient) -> Self {
        Self {
            index: Ok(Arc::new(index)),
            embedder,
        }
    }

    /// Load the index once. A missing or unreadable index leaves the backend
    /// in a permanent not-ready state instead of failing startup.
    pub fn load(index_dir: &Path, embedder: EmbeddingClient) -> Self {
        let index = match VectorIndex::load(index_dir) {
            Ok(index) => Ok(Arc::new(index)),
            Err(e) => {
                warn!("Knowledge base index unavailable: {}", e);
                Err(e.to_string())
            }
        };
        Self { index, embedder }
    }

    async fn search(
        &self,
        index: &VectorIndex,
        query: &str,
        top_k: TopK,
    ) -> Result<Vec<String>, IndexError> {
        let embedding = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|e| IndexError::Embedding(format!("{e:#}")))?;
        let hits = index.search(&embedding, top_k.get())?;
        Ok(hits.into_iter().map(|hit| hit.content).collect())
    }
}

#[async_trait]
impl RetrievalBackend for InProcessBackend {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn retrieve(&self, query: &str, top_k: TopK) -> RetrievalResult {
        if query.trim().is_empty() {
            return RetrievalResult::empty_query();
        }

        let index = match &self.index {
            Ok(index) => index,
            Err(_) => {
                return RetrievalResult::advisory(
                    RetrievalOutcome::IndexMissing,
                    &UNAVAILABLE_ADVISORY,
                )
            }
        };

        match self.search(index, query, top_k).await {
            Ok(snippets) => {
                info!("Retriever: index returned {} snippets", snippets.len());
                RetrievalResult::retrieved(snippets)
            }
            Err(e) => {
                warn!("In-process retrieval failed: {}", e);
                RetrievalResult::advisory(RetrievalOutcome::BackendFailure, &UNAVAILABLE_ADVISORY)
            }
        }
    }

    async fn check_status(&self) -> ReadinessStatus {
        match &self.index {
            Ok(index) if !index.is_empty() => ReadinessStatus {
                ready: true,
                message: ready_message(index.len() as u64),
                details: Some(json!({
                    "doc_count": index.len(),
                    "model": index.model(),
                    "dimension": index.dimension(),
                })),
            },
            Ok(_) => ReadinessStatus::not_ready(NOT_READY_MESSAGE, json!({ "doc_count": 0 })),
            Err(reason) => ReadinessStatus::not_ready(
                NOT_READY_MESSAGE,
                json!({ "doc_count": 0, "error": reason }),
            ),
        }
    }
}
