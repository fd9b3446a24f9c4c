use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the snippets in a [`RetrievalResult`] were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Retrieved,
    WorkerReported,
    LaunchFailure,
    ExitFailure,
    PayloadParseFailure,
    Timeout,
    BackendFailure,
    IndexMissing,
    EmptyQuery,
}

impl RetrievalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalOutcome::Retrieved => "retrieved",
            RetrievalOutcome::WorkerReported => "worker_reported",
            RetrievalOutcome::LaunchFailure => "launch_failure",
            RetrievalOutcome::ExitFailure => "exit_failure",
            RetrievalOutcome::PayloadParseFailure => "payload_parse_failure",
            RetrievalOutcome::Timeout => "timeout",
            RetrievalOutcome::BackendFailure => "backend_failure",
            RetrievalOutcome::IndexMissing => "index_missing",
            RetrievalOutcome::EmptyQuery => "empty_query",
        }
    }
}

/// Ordered snippets handed to prompt composition.
///
/// Order is whatever the backend produced; nothing here re-ranks or dedupes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub snippets: Vec<String>,
    pub outcome: RetrievalOutcome,
}

impl RetrievalResult {
    pub fn retrieved(snippets: Vec<String>) -> Self {
        Self {
            snippets,
            outcome: RetrievalOutcome::Retrieved,
        }
    }

    pub fn advisory(outcome: RetrievalOutcome, lines: &[&str]) -> Self {
        Self {
            snippets: lines.iter().map(|line| line.to_string()).collect(),
            outcome,
        }
    }

    pub fn empty_query() -> Self {
        Self {
            snippets: vec![],
            outcome: RetrievalOutcome::EmptyQuery,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(
            self.outcome,
            RetrievalOutcome::Retrieved | RetrievalOutcome::EmptyQuery
        )
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub message: String,
    /// Passed through from the worker untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ReadinessStatus {
    pub fn not_ready(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            ready: false,
            message: message.into(),
            details: Some(details),
        }
    }
}

// API Request/Response models
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub report_text: Option<String>,
    #[serde(default = "default_use_knowledge_base")]
    pub use_knowledge_base: bool,
    #[serde(default)]
    pub top_k: Option<i64>,
}

fn default_use_knowledge_base() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub rag_system: ReadinessStatus,
    pub timestamp: DateTime<Utc>,
}
