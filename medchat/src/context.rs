use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{BackendKind, Config};
use crate::llm::{EmbeddingClient, GenerationClient};
use crate::metrics::Metrics;
use crate::retrieval::{InProcessBackend, RetrievalBackend, TopK, WorkerBridge, WorkerCommand};

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub backend: Arc<dyn RetrievalBackend>,
    pub generator: GenerationClient,
    pub metrics: Metrics,
    pub default_top_k: TopK,
}

impl AppContext {
    pub fn new(
        backend: Arc<dyn RetrievalBackend>,
        generator: GenerationClient,
        metrics: Metrics,
        default_top_k: TopK,
    ) -> Self {
        Self {
            backend,
            generator,
            metrics,
            default_top_k,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        let backend: Arc<dyn RetrievalBackend> = match config.retrieval.backend {
            BackendKind::Subprocess => {
                let command = WorkerCommand::new(
                    config.retrieval.worker_program.clone(),
                    config.retrieval.worker_args.clone(),
                );
                info!(
                    "Retrieval via worker: {} {}",
                    command.program,
                    command.args.join(" ")
                );
                Arc::new(WorkerBridge::new(command, config.retrieval.worker_timeout))
            }
            BackendKind::InProcess => {
                info!(
                    "Retrieval via resident index in {}",
                    config.retrieval.index_dir.display()
                );
                let embedder = EmbeddingClient::from_config(http.clone(), &config.embedding);
                Arc::new(InProcessBackend::load(&config.retrieval.index_dir, embedder))
            }
        };

        let metrics = Metrics::new().context("Failed to register metrics")?;

        Ok(Self::new(
            backend,
            GenerationClient::new(http, config.llm.clone()),
            metrics,
            config.retrieval.top_k,
        ))
    }
}
