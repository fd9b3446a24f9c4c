// Retrieval: knowledge-base lookups behind a single infallible interface

use async_trait::async_trait;

use crate::models::{ReadinessStatus, RetrievalResult};

pub mod in_process;
pub mod payload;
pub mod subprocess;

pub use in_process::InProcessBackend;
pub use subprocess::{WorkerBridge, WorkerCommand};

pub const MAX_TOP_K: usize = 20;

pub const UNAVAILABLE_ADVISORY: [&str; 2] = [
    "Medical knowledge base is temporarily unavailable.",
    "Check that the retrieval index has been built and try again.",
];

pub const PARSE_FAILURE_ADVISORY: [&str; 1] =
    ["Unable to read the medical knowledge base response."];

pub const LAUNCH_FAILURE_ADVISORY: [&str; 2] = [
    "Medical knowledge base is unavailable.",
    "Install the retrieval worker dependencies and restart the server.",
];

pub const RUNTIME_UNAVAILABLE_MESSAGE: &str = "Python environment not available";

pub fn ready_message(doc_count: u64) -> String {
    format!("Medical knowledge base ready with {doc_count} documents")
}

pub const NOT_READY_MESSAGE: &str = "Medical knowledge base not ready - build the index first";

/// Number of snippets to request, always within `1..=MAX_TOP_K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopK(usize);

impl TopK {
    pub fn clamped(requested: i64) -> Self {
        TopK(requested.clamp(1, MAX_TOP_K as i64) as usize)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for TopK {
    fn default() -> Self {
        TopK(3)
    }
}

/// A source of medical knowledge snippets.
///
/// Both methods always resolve. Backends report trouble through degraded
/// results or a not-ready status, never by failing the caller.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn retrieve(&self, query: &str, top_k: TopK) -> RetrievalResult;

    async fn check_status(&self) -> ReadinessStatus;
}
