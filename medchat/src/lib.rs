//! Medical chat service with optional knowledge-base augmentation.
//!
//! A chat request is answered by a hosted generation API. When the
//! knowledge base reports ready, snippets retrieved for the question (and
//! any attached report) are folded into the prompt first. Retrieval sits
//! behind [`retrieval::RetrievalBackend`], implemented by an external worker
//! process ([`retrieval::WorkerBridge`]) or a resident index
//! ([`retrieval::InProcessBackend`]). Either way a lookup never fails the
//! chat; it degrades to advisory text instead.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod stream;
