//! Decoding of the single JSON object a worker writes to standard output.
//!
//! Workers are free to print warnings or progress lines before the object;
//! everything ahead of the first `{` is dropped. Text after the object is
//! ignored as well.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::WorkerError;

#[derive(Debug, Deserialize)]
pub struct RetrievalPayload {
    #[serde(default)]
    pub chunks: Option<Vec<String>>,
    #[serde(default)]
    pub chunk_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusPayload {
    pub ready: bool,
    pub doc_count: u64,
    /// The whole object as the worker sent it.
    pub raw: Value,
}

/// Parse the first JSON value starting at the first `{` in `stdout`.
pub fn extract<T: DeserializeOwned>(stdout: &str) -> Result<T, WorkerError> {
    let start = stdout.find('{').ok_or_else(|| WorkerError::Payload {
        reason: "no JSON object in worker output".to_string(),
        raw: stdout.to_string(),
    })?;

    let mut values = serde_json::Deserializer::from_str(&stdout[start..]).into_iter::<T>();
    match values.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(WorkerError::Payload {
            reason: e.to_string(),
            raw: stdout.to_string(),
        }),
        None => Err(WorkerError::Payload {
            reason: "empty worker output".to_string(),
            raw: stdout.to_string(),
        }),
    }
}

/// Snippets from a retrieval-mode payload. A worker-side error becomes
/// `WorkerError::Reported` carrying the text unchanged.
pub fn parse_retrieval(stdout: &str) -> Result<Vec<String>, WorkerError> {
    let payload: RetrievalPayload = extract(stdout)?;

    if let Some(error) = payload.error {
        return Err(WorkerError::Reported(error));
    }

    let chunks = payload.chunks.ok_or_else(|| WorkerError::Payload {
        reason: "payload has neither `chunks` nor `error`".to_string(),
        raw: stdout.to_string(),
    })?;

    if let Some(count) = payload.chunk_count {
        if count as usize != chunks.len() {
            tracing::debug!(
                "Worker chunk_count {} disagrees with {} chunks returned",
                count,
                chunks.len()
            );
        }
    }

    Ok(chunks)
}

pub fn parse_status(stdout: &str) -> Result<StatusPayload, WorkerError> {
    let raw: Value = extract(stdout)?;

    let ready = raw
        .get("ready")
        .and_then(Value::as_bool)
        .ok_or_else(|| WorkerError::Payload {
            reason: "status payload is missing boolean `ready`".to_string(),
            raw: stdout.to_string(),
        })?;
    let doc_count = raw
        .get("doc_count")
        .and_then(Value::as_u64)
        .ok_or_else(|| WorkerError::Payload {
            reason: "status payload is missing integer `doc_count`".to_string(),
            raw: stdout.to_string(),
        })?;

    Ok(StatusPayload {
        ready,
        doc_count,
        raw,
    })
}
