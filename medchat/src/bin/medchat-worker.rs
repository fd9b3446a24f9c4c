//! Retrieval worker speaking the bridge protocol over standard output.
//!
//! ```text
//! medchat-worker "<query>" --top-k 3      -> {"chunks": [...], "chunk_count": N}
//! medchat-worker --check-status           -> {"ready": bool, "doc_count": N, ...}
//! medchat-worker --build handbook.pdf     -> {"built": true, "doc_count": N, ...}
//! ```
//!
//! Exactly one JSON object is written to stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use serde_json::{json, Value};

use medchat::config::EmbeddingConfig;
use medchat::index::{self, VectorIndex};
use medchat::llm::EmbeddingClient;
use medchat::retrieval::TopK;

#[derive(Parser, Debug)]
// Stdout carries only the protocol payload, so there is no --help flag;
// "--help" is searched like any other query.
#[command(
    name = "medchat-worker",
    about = "Medical knowledge base retrieval worker",
    disable_help_flag = true
)]
struct Args {
    /// Text to search for; may itself start with `-`
    #[arg(allow_hyphen_values = true)]
    query: Option<String>,

    /// Number of snippets to return
    #[arg(long = "top-k", default_value_t = 3, allow_negative_numbers = true)]
    top_k: i64,

    /// Report whether the index is built and loadable
    #[arg(long = "check-status", conflicts_with_all = ["query", "build"])]
    check_status: bool,

    /// Build the index from a reference document (PDF or plain text)
    #[arg(long, value_name = "SOURCE", conflicts_with = "query")]
    build: Option<PathBuf>,

    /// Rebuild even if an index already exists
    #[arg(long, requires = "build")]
    force_rebuild: bool,

    /// Directory holding the index
    #[arg(long, env = "RAG_INDEX_DIR", default_value = "rag_index")]
    index_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let embedder = EmbeddingClient::from_config(reqwest::Client::new(), &EmbeddingConfig::from_env());

    let (payload, code) = if args.check_status {
        (check_status(&args), ExitCode::SUCCESS)
    } else if let Some(source) = &args.build {
        match build(source, &args, &embedder).await {
            Ok(payload) => (payload, ExitCode::SUCCESS),
            Err(e) => (json!({ "built": false, "error": format!("{e:#}") }), ExitCode::FAILURE),
        }
    } else if let Some(query) = &args.query {
        // Query failures are reported in-band; the bridge treats a non-zero
        // exit as the worker itself being broken.
        let payload = match search(query, TopK::clamped(args.top_k), &args, &embedder).await {
            Ok(chunks) => json!({ "chunk_count": chunks.len(), "chunks": chunks }),
            Err(e) => json!({ "error": format!("{e:#}") }),
        };
        (payload, ExitCode::SUCCESS)
    } else {
        (
            json!({ "error": "nothing to do: pass a query, --check-status or --build" }),
            ExitCode::from(2),
        )
    };

    println!("{payload}");
    code
}

fn check_status(args: &Args) -> Value {
    match VectorIndex::load(&args.index_dir) {
        Ok(index) => json!({
            "ready": !index.is_empty(),
            "doc_count": index.len(),
            "model": index.model(),
            "index_dir": args.index_dir,
        }),
        Err(e) => json!({
            "ready": false,
            "doc_count": 0,
            "message": e.to_string(),
            "index_dir": args.index_dir,
        }),
    }
}

async fn search(
    query: &str,
    top_k: TopK,
    args: &Args,
    embedder: &EmbeddingClient,
) -> Result<Vec<String>> {
    let index = VectorIndex::load(&args.index_dir)?;
    let embedding = embedder.embed_one(query).await?;
    let hits = index.search(&embedding, top_k.get())?;
    Ok(hits.into_iter().map(|hit| hit.content).collect())
}

async fn build(source: &Path, args: &Args, embedder: &EmbeddingClient) -> Result<Value> {
    let text = index::read_source(source)?;
    if text.trim().is_empty() {
        anyhow::bail!("No text could be extracted from {}", source.display());
    }

    let built = index::build_from_text(&text, &args.index_dir, embedder, args.force_rebuild).await?;

    Ok(json!({
        "built": true,
        "doc_count": built.len(),
        "dimension": built.dimension(),
        "index_dir": args.index_dir,
    }))
}
