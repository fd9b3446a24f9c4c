// Worker bridge: one external process per call, output read from stdout only

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::{info, warn};

use super::{
    payload, ready_message, RetrievalBackend, TopK, LAUNCH_FAILURE_ADVISORY,
    NOT_READY_MESSAGE, PARSE_FAILURE_ADVISORY, RUNTIME_UNAVAILABLE_MESSAGE,
    UNAVAILABLE_ADVISORY,
};
use crate::error::WorkerError;
use crate::models::{ReadinessStatus, RetrievalOutcome, RetrievalResult};

/// Program plus the fixed leading arguments, e.g. `medchat-worker --index-dir rag_index`.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn retrieval_args(&self, query: &str, top_k: TopK) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(query.to_string());
        args.push("--top-k".to_string());
        args.push(top_k.get().to_string());
        args
    }

    fn status_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--check-status".to_string());
        args
    }
}

pub struct WorkerBridge {
    command: WorkerCommand,
    timeout: Option<Duration>,
}

impl WorkerBridge {
    pub fn new(command: WorkerCommand, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }

    /// Run the worker to completion and return its standard output.
    ///
    /// Stderr is discarded. The child is killed if this future is dropped,
    /// which covers both the timeout and an abandoned request.
    async fn run(&self, args: Vec<String>) -> Result<String, WorkerError> {
        let child = Command::new(&self.command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Launch {
                program: self.command.program.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| WorkerError::Timeout(limit))??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            return Err(WorkerError::Exit {
                code: output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn query_worker(&self, query: &str, top_k: TopK) -> Result<Vec<String>, WorkerError> {
        let stdout = self.run(self.command.retrieval_args(query, top_k)).await?;
        payload::parse_retrieval(&stdout)
    }
}

/// Map a failed retrieval call onto the fixed advisory snippets.
pub fn degrade(err: WorkerError) -> RetrievalResult {
    match err {
        WorkerError::Reported(text) => RetrievalResult {
            snippets: vec![text],
            outcome: RetrievalOutcome::WorkerReported,
        },
        WorkerError::Launch { program, source } => {
            warn!("Retrieval worker `{}` could not be launched: {}", program, source);
            RetrievalResult::advisory(RetrievalOutcome::LaunchFailure, &LAUNCH_FAILURE_ADVISORY)
        }
        WorkerError::Exit { code } => {
            warn!("Retrieval worker exited with code {:?}", code);
            RetrievalResult::advisory(RetrievalOutcome::ExitFailure, &UNAVAILABLE_ADVISORY)
        }
        WorkerError::Timeout(limit) => {
            warn!("Retrieval worker killed after {:?}", limit);
            RetrievalResult::advisory(RetrievalOutcome::Timeout, &UNAVAILABLE_ADVISORY)
        }
        WorkerError::Payload { reason, raw } => {
            warn!("Unparseable retrieval worker output ({}): {}", reason, raw);
            RetrievalResult::advisory(
                RetrievalOutcome::PayloadParseFailure,
                &PARSE_FAILURE_ADVISORY,
            )
        }
        WorkerError::Io(e) => {
            warn!("Lost contact with retrieval worker: {}", e);
            RetrievalResult::advisory(RetrievalOutcome::ExitFailure, &UNAVAILABLE_ADVISORY)
        }
    }
}

fn status_from_error(err: WorkerError) -> ReadinessStatus {
    warn!("Retrieval worker status check failed: {}", err);
    match err {
        WorkerError::Launch { program, source } => ReadinessStatus::not_ready(
            RUNTIME_UNAVAILABLE_MESSAGE,
            json!({ "program": program, "error": source.to_string() }),
        ),
        WorkerError::Exit { code } => ReadinessStatus::not_ready(
            "Retrieval worker failed while checking status",
            json!({ "exit_code": code }),
        ),
        WorkerError::Payload { reason, raw } => ReadinessStatus::not_ready(
            "Retrieval worker returned an unreadable status",
            json!({ "reason": reason, "raw_output": raw }),
        ),
        WorkerError::Timeout(limit) => ReadinessStatus::not_ready(
            "Retrieval worker timed out while checking status",
            json!({ "timeout_secs": limit.as_secs_f64() }),
        ),
        WorkerError::Reported(text) => {
            ReadinessStatus::not_ready(text.clone(), json!({ "error": text }))
        }
        WorkerError::Io(e) => ReadinessStatus::not_ready(
            "Retrieval worker failed while checking status",
            json!({ "error": e.to_string() }),
        ),
    }
}

#[async_trait]
impl RetrievalBackend for WorkerBridge {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn retrieve(&self, query: &str, top_k: TopK) -> RetrievalResult {
        if query.trim().is_empty() {
            return RetrievalResult::empty_query();
        }

        info!("Retriever: querying worker (top_k = {})", top_k.get());
        match self.query_worker(query, top_k).await {
            Ok(chunks) => {
                info!("Retriever: worker returned {} snippets", chunks.len());
                RetrievalResult::retrieved(chunks)
            }
            Err(err) => degrade(err),
        }
    }

    async fn check_status(&self) -> ReadinessStatus {
        let parsed = match self.run(self.command.status_args()).await {
            Ok(stdout) => payload::parse_status(&stdout),
            Err(err) => Err(err),
        };

        match parsed {
            Ok(status) => ReadinessStatus {
                ready: status.ready,
                message: if status.ready {
                    ready_message(status.doc_count)
                } else {
                    NOT_READY_MESSAGE.to_string()
                },
                details: Some(status.raw),
            },
            Err(err) => status_from_error(err),
        }
    }
}
