use std::time::Duration;

/// Embedding dimension used across the pipeline
pub const DEFAULT_DIMENSION: usize = 384;
/// Records per processing sub-batch
pub const DEFAULT_SUB_BATCH_SIZE: usize = 50;
/// Maximum texts per remote provider call
pub const DEFAULT_PROVIDER_BATCH_LIMIT: usize = 100;
/// Character cap applied before submitting text to the remote provider
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8191;
/// Courtesy pause between sub-batches
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(100);
/// Default cosine-distance cutoff for similarity search
pub const DEFAULT_THRESHOLD: f32 = 0.8;
/// Default result cap for general similarity queries
pub const DEFAULT_LIMIT: usize = 20;
/// Default result cap for "similar to record X" queries
pub const DEFAULT_SIMILAR_LIMIT: usize = 10;
/// Candidate over-fetch multiplier applied before post-filtering
pub const DEFAULT_OVERSAMPLE: usize = 4;

/// Tuning knobs for the embedding pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dimension: usize,
    pub sub_batch_size: usize,
    pub provider_batch_limit: usize,
    pub max_input_chars: usize,
    pub batch_pause: Duration,
    pub default_threshold: f32,
    pub default_limit: usize,
    pub similar_limit: usize,
    pub oversample: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            sub_batch_size: DEFAULT_SUB_BATCH_SIZE,
            provider_batch_limit: DEFAULT_PROVIDER_BATCH_LIMIT,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            batch_pause: DEFAULT_BATCH_PAUSE,
            default_threshold: DEFAULT_THRESHOLD,
            default_limit: DEFAULT_LIMIT,
            similar_limit: DEFAULT_SIMILAR_LIMIT,
            oversample: DEFAULT_OVERSAMPLE,
        }
    }
}

impl PipelineConfig {
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_sub_batch_size(mut self, size: usize) -> Self {
        self.sub_batch_size = size.max(1);
        self
    }

    pub fn with_provider_batch_limit(mut self, limit: usize) -> Self {
        self.provider_batch_limit = limit.max(1);
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample.max(1);
        self
    }

    /// Load overrides from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dimension: env_parse("EMBEDDING_DIMENSION", defaults.dimension),
            sub_batch_size: env_parse("EMBEDDING_SUB_BATCH_SIZE", defaults.sub_batch_size).max(1),
            provider_batch_limit: env_parse(
                "EMBEDDING_PROVIDER_BATCH_LIMIT",
                defaults.provider_batch_limit,
            )
            .max(1),
            max_input_chars: env_parse("EMBEDDING_MAX_INPUT_CHARS", defaults.max_input_chars),
            batch_pause: Duration::from_millis(env_parse(
                "EMBEDDING_BATCH_PAUSE_MS",
                defaults.batch_pause.as_millis() as u64,
            )),
            default_threshold: env_parse("EMBEDDING_DEFAULT_THRESHOLD", defaults.default_threshold),
            default_limit: env_parse("EMBEDDING_DEFAULT_LIMIT", defaults.default_limit),
            similar_limit: env_parse("EMBEDDING_SIMILAR_LIMIT", defaults.similar_limit),
            oversample: env_parse("EMBEDDING_OVERSAMPLE", defaults.oversample).max(1),
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.dimension, 384);
        assert_eq!(config.sub_batch_size, 50);
        assert_eq!(config.provider_batch_limit, 100);
        assert_eq!(config.max_input_chars, 8191);
        assert_eq!(config.batch_pause, Duration::from_millis(100));
        assert_eq!(config.default_threshold, 0.8);
        assert_eq!(config.default_limit, 20);
        assert_eq!(config.similar_limit, 10);
    }

    #[test]
    fn test_builders_clamp_to_one() {
        let config = PipelineConfig::default()
            .with_sub_batch_size(0)
            .with_provider_batch_limit(0)
            .with_oversample(0);
        assert_eq!(config.sub_batch_size, 1);
        assert_eq!(config.provider_batch_limit, 1);
        assert_eq!(config.oversample, 1);
    }
}
