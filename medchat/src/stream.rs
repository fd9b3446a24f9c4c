//! Chat response stream: newline-delimited JSON, one event per line.
//!
//! Every line carries the schema version `v` and a `type` tag. A stream
//! always opens with `context` and closes with `done`; `error` may appear
//! in between.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ReadinessStatus, RetrievalOutcome};

pub const SCHEMA_VERSION: u8 = 1;
pub const CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Context {
        request_id: Uuid,
        rag_status: ReadinessStatus,
        snippet_count: usize,
        retrieval: Option<RetrievalOutcome>,
    },
    Delta {
        content: String,
    },
    Error {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Done {
        request_id: Uuid,
        model: String,
        finished_at: DateTime<Utc>,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    v: u8,
    #[serde(flatten)]
    event: &'a StreamEvent,
}

impl StreamEvent {
    pub fn to_line(&self) -> Bytes {
        let mut line = serde_json::to_vec(&Envelope {
            v: SCHEMA_VERSION,
            event: self,
        })
        .unwrap_or_else(|e| {
            // unreachable for these field types
            serde_json::json!({
                "v": SCHEMA_VERSION,
                "type": "error",
                "message": format!("unserializable event: {e}"),
            })
            .to_string()
            .into_bytes()
        });
        line.push(b'\n');
        Bytes::from(line)
    }
}
