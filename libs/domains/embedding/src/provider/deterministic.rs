use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::error::EmbeddingResult;

/// Canonical text normalization applied before hashing
///
/// Cache keys and the deterministic generator both go through this, so
/// "Camden Burglary" and "  camden burglary " resolve to the same entry.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Stable 32-bit polynomial hash of a string
///
/// Must not change between releases: cache keys and fallback vectors are
/// derived from it.
pub fn stable_hash(text: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    hash
}

/// Local generator producing reproducible pseudo-embeddings
///
/// Used whenever the remote provider is unconfigured or failing, so
/// ingestion and search stay available in a lower-quality mode. The same
/// normalized text always yields the same unit-length vector.
#[derive(Debug, Clone)]
pub struct DeterministicProvider {
    dimension: usize,
}

impl DeterministicProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Derive the pseudo-embedding for a text
    ///
    /// Component `i` is `sin(hash * (i + 1)) * 0.5`, computed in f64 for
    /// platform-stable rounding, then the vector is L2-normalized.
    pub fn generate(&self, text: &str) -> Vec<f32> {
        let seed = f64::from(stable_hash(&normalize_text(text)));
        let mut values: Vec<f32> = (0..self.dimension)
            .map(|i| ((seed * (i as f64 + 1.0)).sin() * 0.5) as f32)
            .collect();

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut values {
                *v /= norm;
            }
        } else if let Some(first) = values.first_mut() {
            // hash == 0 degenerates to the zero vector; pin a unit axis
            *first = 1.0;
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicProvider {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(self.generate(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.generate(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_same_vector() {
        let provider = DeterministicProvider::new(384);
        let a = provider.generate("robbery near station");
        let b = provider.generate("robbery near station");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[test]
    fn test_normalization_folds_case_and_whitespace() {
        let provider = DeterministicProvider::new(64);
        assert_eq!(
            provider.generate("Camden Burglary"),
            provider.generate("  camden burglary ")
        );
    }

    #[test]
    fn test_distinct_texts_diverge() {
        let provider = DeterministicProvider::new(64);
        assert_ne!(
            provider.generate("camden burglary"),
            provider.generate("euston robbery")
        );
    }

    #[test]
    fn test_unit_norm() {
        let provider = DeterministicProvider::new(384);
        for text in ["robbery near station", "a", "vehicle theft on high street"] {
            let vector = provider.generate(text);
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!(
                (norm - 1.0).abs() < 1e-6,
                "norm for {text:?} was {norm}, expected 1.0"
            );
        }
    }

    #[test]
    fn test_zero_hash_still_unit_length() {
        // The empty string hashes to 0; every sin component collapses to 0.
        let provider = DeterministicProvider::new(8);
        let vector = provider.generate("");
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stable_hash_is_stable() {
        // Pinned value: changing the hash silently invalidates cache keys.
        assert_eq!(stable_hash(""), 0);
        assert_eq!(stable_hash("a"), 97);
        assert_eq!(
            stable_hash("camden burglary"),
            stable_hash("camden burglary")
        );
    }
}
