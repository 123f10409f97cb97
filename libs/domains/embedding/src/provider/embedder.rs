use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::{DeterministicProvider, EmbeddingProvider};
use crate::config::PipelineConfig;

/// Resilient embedding front door used by the pipeline
///
/// Wraps the optional remote provider with the deterministic fallback:
/// callers always get a vector for non-blank text, never a provider error.
/// Blank text yields `None` at its position rather than an error.
pub struct TextEmbedder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    fallback: DeterministicProvider,
    max_input_chars: usize,
    provider_batch_limit: usize,
    fallback_warned: AtomicBool,
}

impl TextEmbedder {
    pub fn new(config: &PipelineConfig) -> Self {
        debug!(
            dimension = config.dimension,
            "No remote embedding provider configured; using deterministic embeddings"
        );
        Self {
            provider: None,
            fallback: DeterministicProvider::new(config.dimension),
            max_input_chars: config.max_input_chars,
            provider_batch_limit: config.provider_batch_limit,
            fallback_warned: AtomicBool::new(false),
        }
    }

    pub fn with_provider(
        config: &PipelineConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        info!(provider = provider.name(), dimension = config.dimension, "Embedding provider configured");
        Self {
            provider: Some(provider),
            fallback: DeterministicProvider::new(config.dimension),
            max_input_chars: config.max_input_chars,
            provider_batch_limit: config.provider_batch_limit,
            fallback_warned: AtomicBool::new(false),
        }
    }

    pub fn dimension(&self) -> usize {
        self.fallback.dimension()
    }

    /// Generate an embedding for one text; `None` for blank input
    pub async fn generate(&self, text: &str) -> Option<Vec<f32>> {
        let texts = [text.to_string()];
        self.generate_batch(&texts).await.pop().flatten()
    }

    /// Generate embeddings for a batch of texts
    ///
    /// The output has exactly one entry per input, in input order. Blank
    /// positions are `None`. Non-blank texts are truncated at the character
    /// cap, submitted to the remote provider in sub-chunks no larger than
    /// the API limit, and reassembled in order; any provider failure drops
    /// the affected chunk to the deterministic generator.
    pub async fn generate_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        let pending: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| (i, self.prepare(text)))
            .collect();

        for chunk in pending.chunks(self.provider_batch_limit) {
            let inputs: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.embed_chunk(&inputs).await;
            for ((position, _), vector) in chunk.iter().zip(vectors) {
                out[*position] = Some(vector);
            }
        }

        out
    }

    /// Truncate to the provider character cap, respecting char boundaries
    fn prepare(&self, text: &str) -> String {
        if text.chars().count() > self.max_input_chars {
            text.chars().take(self.max_input_chars).collect()
        } else {
            text.to_string()
        }
    }

    async fn embed_chunk(&self, inputs: &[String]) -> Vec<Vec<f32>> {
        if let Some(provider) = &self.provider {
            match provider.embed_batch(inputs).await {
                Ok(vectors)
                    if vectors.len() == inputs.len()
                        && vectors.iter().all(|v| v.len() == self.dimension()) =>
                {
                    return vectors;
                }
                Ok(vectors) => {
                    self.warn_fallback(
                        provider.name(),
                        &format!(
                            "provider returned {} vectors of unexpected shape for {} inputs",
                            vectors.len(),
                            inputs.len()
                        ),
                    );
                }
                Err(err) => {
                    self.warn_fallback(provider.name(), &err.to_string());
                }
            }
        }

        inputs.iter().map(|text| self.fallback.generate(text)).collect()
    }

    /// Log the first fallback only; a flapping provider would otherwise
    /// emit one warning per chunk.
    fn warn_fallback(&self, provider: &str, reason: &str) {
        if !self.fallback_warned.swap(true, Ordering::Relaxed) {
            warn!(
                provider,
                reason, "Embedding provider failed; falling back to deterministic embeddings"
            );
        }
    }
}
