use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retrieval::{TopK, MAX_TOP_K};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Subprocess,
    InProcess,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "subprocess" | "worker" => Ok(BackendKind::Subprocess),
            "in-process" | "in_process" | "inprocess" => Ok(BackendKind::InProcess),
            _ => Err(ConfigError::Invalid {
                var: "RAG_BACKEND",
                value: value.to_string(),
                reason: "expected `subprocess` or `in-process`".to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Subprocess => "subprocess",
            BackendKind::InProcess => "in-process",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub service_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub backend: BackendKind,
    pub worker_program: String,
    pub worker_args: Vec<String>,
    /// `None` lets the worker run unbounded.
    pub worker_timeout: Option<Duration>,
    pub index_dir: PathBuf,
    pub top_k: TopK,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    /// Browser origins allowed by CORS; empty allows any origin.
    pub cors_origins: Vec<String>,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            port: parse_var("PORT", &env_or("PORT", "8080"))?,
            log_level: env_or("LOG_LEVEL", "info"),
            cors_origins: parse_origins(&env_or("CORS_ALLOWED_ORIGINS", ""))?,
            llm: LlmConfig::from_env()?,
            embedding: EmbeddingConfig::from_env(),
            retrieval: RetrievalConfig::from_env()?,
        })
    }
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("LLM_API_KEY"))?;

        let timeout_secs: u64 =
            parse_var("LLM_TIMEOUT_SECS", &env_or("LLM_TIMEOUT_SECS", "120"))?;

        Ok(LlmConfig {
            api_key,
            base_url: env_or("LLM_BASE_URL", "https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
            model: env_or("LLM_MODEL", "gpt-4o-mini"),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        EmbeddingConfig {
            service_url: env_or("EMBEDDING_SERVICE_URL", "http://localhost:8002")
                .trim_end_matches('/')
                .to_string(),
            model: env_or("EMBEDDING_MODEL", "all-MiniLM-L6-v2"),
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = BackendKind::parse(&env_or("RAG_BACKEND", "subprocess"))?;

        let timeout_secs: u64 = parse_var(
            "RAG_WORKER_TIMEOUT_SECS",
            &env_or("RAG_WORKER_TIMEOUT_SECS", "30"),
        )?;

        Ok(RetrievalConfig {
            backend,
            worker_program: env_or("RAG_WORKER_PROGRAM", DEFAULT_WORKER_PROGRAM),
            worker_args: split_args(&env_or("RAG_WORKER_ARGS", "")),
            worker_timeout: timeout_from_secs(timeout_secs),
            index_dir: PathBuf::from(env_or("RAG_INDEX_DIR", "rag_index")),
            top_k: parse_top_k(&env_or("RAG_TOP_K", "3"))?,
        })
    }
}

/// The worker binary built alongside the service, looked up on `PATH`.
pub const DEFAULT_WORKER_PROGRAM: &str = "medchat-worker";

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn split_args(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

pub(crate) fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Comma-separated `scheme://host[:port]` origins.
pub(crate) fn parse_origins(value: &str) -> Result<Vec<String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| match origin.split_once("://") {
            Some((scheme, host)) if !scheme.is_empty() && !host.is_empty() && !host.contains('/') => {
                Ok(origin.to_string())
            }
            _ => Err(ConfigError::Invalid {
                var: "CORS_ALLOWED_ORIGINS",
                value: origin.to_string(),
                reason: "expected scheme://host[:port]".to_string(),
            }),
        })
        .collect()
}

/// Unlike per-request values, a configured default outside the range is an error.
pub(crate) fn parse_top_k(value: &str) -> Result<TopK, ConfigError> {
    let requested: i64 = parse_var("RAG_TOP_K", value)?;
    if requested < 1 || requested > MAX_TOP_K as i64 {
        return Err(ConfigError::Invalid {
            var: "RAG_TOP_K",
            value: value.to_string(),
            reason: format!("must be between 1 and {MAX_TOP_K}"),
        });
    }
    Ok(TopK::clamped(requested))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_accepts_known_names() {
        assert_eq!(BackendKind::parse("subprocess").unwrap(), BackendKind::Subprocess);
        assert_eq!(BackendKind::parse(" In-Process ").unwrap(), BackendKind::InProcess);
        assert_eq!(BackendKind::parse("in_process").unwrap(), BackendKind::InProcess);
    }

    #[test]
    fn backend_kind_rejects_unknown_name() {
        let err = BackendKind::parse("pinecone").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RAG_BACKEND", .. }));
    }

    #[test]
    fn worker_args_split_on_whitespace() {
        assert_eq!(
            split_args("  lib/rag_service.py   --quiet "),
            vec!["lib/rag_service.py".to_string(), "--quiet".to_string()]
        );
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn zero_timeout_disables_it() {
        assert_eq!(timeout_from_secs(0), None);
        assert_eq!(timeout_from_secs(5), Some(Duration::from_secs(5)));
    }

    #[test]
    fn top_k_out_of_range_is_rejected() {
        assert_eq!(parse_top_k("3").unwrap().get(), 3);
        assert!(parse_top_k("0").is_err());
        assert!(parse_top_k("-2").is_err());
        assert!(parse_top_k("21").is_err());
        assert!(parse_top_k("three").is_err());
    }

    #[test]
    fn cors_origins_are_comma_separated() {
        assert!(parse_origins("").unwrap().is_empty());
        assert_eq!(
            parse_origins(" https://clinic.example , http://localhost:3000,").unwrap(),
            vec!["https://clinic.example", "http://localhost:3000"]
        );
    }

    #[test]
    fn cors_origin_with_path_is_rejected() {
        for bad in ["clinic.example", "https://clinic.example/app", "://x"] {
            assert!(matches!(
                parse_origins(bad),
                Err(ConfigError::Invalid { var: "CORS_ALLOWED_ORIGINS", .. })
            ));
        }
    }

    #[test]
    fn invalid_port_names_the_variable() {
        let err = parse_var::<u16>("PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert!(err.to_string().contains("eighty"));
    }
}
