mod deterministic;
mod embedder;
mod openai;

use async_trait::async_trait;

use crate::error::EmbeddingResult;

pub use deterministic::{normalize_text, stable_hash, DeterministicProvider};
pub use embedder::TextEmbedder;
pub use openai::{OpenAIConfig, OpenAIProvider};

/// Trait for embedding generation providers
///
/// Implementations wrap a remote text-to-vector API or a local generator.
/// `embed_batch` must preserve input order and return exactly one vector
/// per input text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name for logging
    fn name(&self) -> &'static str;

    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in one call
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;
}
