use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for the embedding service (`POST {url}/embed`).
#[derive(Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    service_url: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(http: reqwest::Client, service_url: String, model: String) -> Self {
        Self {
            http,
            service_url,
            model,
        }
    }

    pub fn from_config(http: reqwest::Client, config: &EmbeddingConfig) -> Self {
        Self::new(http, config.service_url.clone(), config.model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.service_url);
        debug!("Embedding {} texts via {}", texts.len(), url);

        let resp = self
            .http
            .post(&url)
            .json(&EmbedRequest { texts })
            .send()
            .await
            .with_context(|| format!("Failed to reach embedding service at {url}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Embedding service returned {status}: {body}");
        }

        let data: EmbedResponse = resp
            .json()
            .await
            .context("Embedding service returned malformed JSON")?;

        if data.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding service returned {} vectors for {} texts",
                data.embeddings.len(),
                texts.len()
            );
        }

        Ok(data.embeddings)
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .context("No embedding returned")
    }
}
