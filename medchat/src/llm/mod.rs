// Hosted model collaborators: embedding service and chat generation

pub mod embeddings;
pub mod generation;

pub use embeddings::EmbeddingClient;
pub use generation::{ChatMessage, GenerationClient};
