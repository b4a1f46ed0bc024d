//! Text embedding with a trained model and a deterministic fallback.
//!
//! [`EmbeddingService`] turns text into fixed-dimension vectors. The primary
//! backend runs a sentence-embedding model locally via fastembed; models are
//! downloaded on first use and cached, after which inference is fully
//! offline. When the model cannot load (crate built without the
//! `local-embeddings` feature, download failure, initialization error) the
//! service degrades permanently to a deterministic hash-based embedding for
//! its lifetime and logs the condition once.
//!
//! [`EmbeddingService::encode`] never fails: an inference error on a batch
//! falls back to the hash embedding for that batch only.
//!
//! The fallback embedding is crude by design. Callers get consistency (same
//! text, same vector) and nonzero similarity for overlapping character and
//! word content, not semantic accuracy.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

#[cfg(feature = "local-embeddings")]
use anyhow::Result;
#[cfg(feature = "local-embeddings")]
use std::sync::Mutex;

use crate::config::EmbeddingConfig;

/// Dimension of fallback vectors.
pub const FALLBACK_DIMS: usize = 384;

enum Backend {
    #[cfg(feature = "local-embeddings")]
    Trained {
        model: Mutex<fastembed::TextEmbedding>,
        name: String,
        dims: usize,
    },
    Fallback,
}

/// Embedding backend selected once at construction.
pub struct EmbeddingService {
    backend: Backend,
    /// Texts per trained-inference batch; the fallback has no batching.
    #[cfg(feature = "local-embeddings")]
    batch_size: usize,
}

impl EmbeddingService {
    /// Build the service for the configured provider.
    ///
    /// Provider `"local"` loads the trained model and degrades to the
    /// fallback if that fails; provider `"fallback"` skips the model
    /// entirely. Construction itself never fails.
    pub fn new(config: &EmbeddingConfig) -> Self {
        let backend = match config.provider.as_str() {
            "fallback" => Backend::Fallback,
            _ => Self::trained_or_fallback(config),
        };

        Self {
            backend,
            #[cfg(feature = "local-embeddings")]
            batch_size: config.batch_size,
        }
    }

    #[cfg(feature = "local-embeddings")]
    fn trained_or_fallback(config: &EmbeddingConfig) -> Backend {
        match Self::load_trained(config) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Failed to load embedding model, using fallback: {}", e);
                Backend::Fallback
            }
        }
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn trained_or_fallback(_config: &EmbeddingConfig) -> Backend {
        warn!("Built without local-embeddings, using fallback embeddings");
        Backend::Fallback
    }

    #[cfg(feature = "local-embeddings")]
    fn load_trained(config: &EmbeddingConfig) -> Result<Backend> {
        let (fastembed_model, dims) = resolve_model(&config.model)?;

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize embedding model: {}", e))?;

        tracing::info!("Loaded embedding model: {}", config.model);

        Ok(Backend::Trained {
            model: Mutex::new(model),
            name: config.model.clone(),
            dims,
        })
    }

    /// Encode a batch of texts, one vector per input, in input order.
    ///
    /// All vectors share this service's dimension. Inference failure on the
    /// trained backend is logged and the affected batch is re-encoded with
    /// the fallback at the trained dimension.
    pub fn encode(&self, texts: &[String]) -> Vec<Vec<f32>> {
        match &self.backend {
            #[cfg(feature = "local-embeddings")]
            Backend::Trained { model, dims, .. } => {
                let mut model = model.lock().unwrap();
                match model.embed(texts.to_vec(), Some(self.batch_size)) {
                    Ok(vectors) => vectors,
                    Err(e) => {
                        tracing::error!("Embedding inference failed, using fallback: {}", e);
                        texts
                            .iter()
                            .map(|t| fallback_embedding(t, *dims))
                            .collect()
                    }
                }
            }
            Backend::Fallback => {
                debug!("Using fallback embeddings for {} texts", texts.len());
                texts
                    .iter()
                    .map(|t| fallback_embedding(t, FALLBACK_DIMS))
                    .collect()
            }
        }
    }

    /// Encode a single text (e.g. a search query).
    pub fn encode_one(&self, text: &str) -> Vec<f32> {
        self.encode(&[text.to_string()])
            .pop()
            .unwrap_or_else(|| vec![0.0; self.dims()])
    }

    /// Identifier of the active model, or `"fallback"`.
    pub fn model_name(&self) -> &str {
        match &self.backend {
            #[cfg(feature = "local-embeddings")]
            Backend::Trained { name, .. } => name,
            Backend::Fallback => "fallback",
        }
    }

    /// Vector dimension produced by this service.
    pub fn dims(&self) -> usize {
        match &self.backend {
            #[cfg(feature = "local-embeddings")]
            Backend::Trained { dims, .. } => *dims,
            Backend::Fallback => FALLBACK_DIMS,
        }
    }

    /// Whether the trained model is active (false once degraded).
    pub fn is_trained(&self) -> bool {
        !matches!(self.backend, Backend::Fallback)
    }
}

#[cfg(feature = "local-embeddings")]
fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel;

    let resolved = match name {
        "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "nomic-embed-text-v1" => (EmbeddingModel::NomicEmbedTextV1, 768),
        "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
        "multilingual-e5-base" => (EmbeddingModel::MultilingualE5Base, 768),
        "multilingual-e5-large" => (EmbeddingModel::MultilingualE5Large, 1024),
        other => anyhow::bail!(
            "Unknown embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    };

    Ok(resolved)
}

// ============ Fallback embedding ============

/// Deterministic hash-based embedding.
///
/// Lower-cases the text, accumulates per-character frequencies of
/// alphanumeric characters into hashed buckets weighted by `count / length`,
/// adds a `1 / word_count` contribution for each of the first 20 words
/// longer than 2 characters, then L2-normalizes. The zero vector stays zero.
/// Same text always produces the same vector, across processes and restarts.
pub fn fallback_embedding(text: &str, dims: usize) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let total_chars = lowered.chars().count();

    let mut embedding = vec![0.0f32; dims];
    if total_chars == 0 {
        return embedding;
    }

    // Character frequency features. BTreeMap keeps the accumulation order
    // deterministic, so repeat calls are bit-identical.
    let mut char_counts: BTreeMap<char, usize> = BTreeMap::new();
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            *char_counts.entry(c).or_insert(0) += 1;
        }
    }
    for (c, count) in &char_counts {
        let bucket = stable_bucket(&c.to_string(), dims);
        embedding[bucket] += *count as f32 / total_chars as f32;
    }

    // Word-level features over the first 20 words.
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if !words.is_empty() {
        let weight = 1.0 / words.len() as f32;
        for word in words.iter().take(20) {
            if word.chars().count() > 2 {
                let bucket = stable_bucket(word, dims);
                embedding[bucket] += weight;
            }
        }
    }

    l2_normalize(&mut embedding);
    embedding
}

/// Map a token to a bucket index via the first 8 bytes of its SHA-256.
///
/// Stable across processes, unlike a hasher with per-process seeding.
fn stable_bucket(token: &str, dims: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % dims as u64) as usize
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ============ Vector utilities ============

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or when either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_service() -> EmbeddingService {
        let config = EmbeddingConfig {
            provider: "fallback".to_string(),
            ..Default::default()
        };
        EmbeddingService::new(&config)
    }

    #[test]
    fn test_cosine_parallel_and_antiparallel() {
        let a = vec![0.5, 1.5, -2.0];
        let scaled: Vec<f32> = a.iter().map(|x| x * 3.0).collect();
        assert!((cosine_similarity(&a, &scaled) - 1.0).abs() < 1e-6);

        let flipped: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&a, &flipped) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_scores_zero() {
        let sim = cosine_similarity(&[2.0, 0.0, 1.0], &[0.0, 3.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_known_angle() {
        // 45 degrees between (1, 0) and (1, 1).
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0]);
        assert!((sim - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs_score_zero() {
        // Zero norm, empty, and mismatched lengths all short-circuit.
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_fallback_deterministic() {
        let a = fallback_embedding("The quick brown fox jumps over the lazy dog.", FALLBACK_DIMS);
        let b = fallback_embedding("The quick brown fox jumps over the lazy dog.", FALLBACK_DIMS);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_fixed_dimension() {
        for text in ["", "a", "hello world", "many words repeated ", "日本語テキスト"] {
            assert_eq!(fallback_embedding(text, FALLBACK_DIMS).len(), FALLBACK_DIMS);
        }
    }

    #[test]
    fn test_fallback_empty_text_is_zero_vector() {
        let v = fallback_embedding("", FALLBACK_DIMS);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_fallback_is_normalized() {
        let v = fallback_embedding("normalize me please", FALLBACK_DIMS);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fallback_overlapping_text_has_positive_similarity() {
        let a = fallback_embedding("alpha beta gamma", FALLBACK_DIMS);
        let b = fallback_embedding("alpha", FALLBACK_DIMS);
        assert!(cosine_similarity(&a, &b) > 0.0);
    }

    #[test]
    fn test_fallback_service_reports_itself() {
        let service = fallback_service();
        assert!(!service.is_trained());
        assert_eq!(service.model_name(), "fallback");
        assert_eq!(service.dims(), FALLBACK_DIMS);
    }

    #[test]
    fn test_encode_shape_and_order() {
        let service = fallback_service();
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let vectors = service.encode(&texts);
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == FALLBACK_DIMS));
        assert_eq!(vectors[0], fallback_embedding("first text", FALLBACK_DIMS));
        assert_eq!(vectors[1], fallback_embedding("second text", FALLBACK_DIMS));
    }

    #[test]
    fn test_encode_one_matches_batch() {
        let service = fallback_service();
        let single = service.encode_one("a query");
        let batch = service.encode(&["a query".to_string()]);
        assert_eq!(single, batch[0]);
    }
}
