use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use warp::{reject::Reject, Rejection, Reply};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl Reject for ApiError {}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = match api_err {
            ApiError::BadRequest(_) => (warp::http::StatusCode::BAD_REQUEST, "Bad request"),
            _ => (
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ),
        };

        let json = warp::reply::json(&serde_json::json!({
            "error": message,
            "details": api_err.to_string(),
        }));

        Ok(warp::reply::with_status(json, code))
    } else {
        Err(err)
    }
}

/// Ways a call into the out-of-process retrieval worker can go wrong.
///
/// None of these reach HTTP callers: the bridge turns each one into advisory
/// snippets or a not-ready status.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to launch worker `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker exited with status {}", exit_code_label(.code))]
    Exit { code: Option<i32> },

    #[error("worker output could not be parsed: {reason}")]
    Payload { reason: String, raw: String },

    #[error("worker reported an error: {0}")]
    Reported(String),

    #[error("worker did not finish within {0:?}")]
    Timeout(Duration),

    #[error("i/o error while waiting for worker: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown (terminated by signal)".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index not found at {0}")]
    NotFound(PathBuf),

    #[error("index i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("could not read text from {}: {reason}", .path.display())]
    Extract { path: PathBuf, reason: String },
}
