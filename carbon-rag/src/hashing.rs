//! Local, deterministic embedding provider based on signed feature hashing.
//!
//! [`HashingEmbedder`] needs no model download and no network access. Text is
//! lower-cased and split into alphanumeric words; every word (weight 1.0) and
//! every pair of adjacent words (weight 0.5) is hashed with SHA-256 into one
//! of `dimensions` buckets with a sign taken from the digest. The bucket
//! vector is then L2-normalized. Texts sharing vocabulary score a positive
//! inner product.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result};

/// Domain separation prefix mixed into every feature hash.
const HASH_SALT: &[u8] = b"carbon-rag:hashing-embedder:v1";

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// An [`EmbeddingProvider`] that hashes word features into a fixed-size vector.
///
/// # Example
///
/// ```rust,ignore
/// use carbon_rag::HashingEmbedder;
///
/// let embedder = HashingEmbedder::new(384)?;
/// let vector = embedder.embed("Scope 1 emissions").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Default dimensionality, matching common sentence-embedding models.
    pub const DEFAULT_DIMENSIONS: usize = 384;

    /// Create an embedder producing `dimensions`-long vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::ConfigError("embedding dimensions must be non-zero".into()));
        }
        Ok(Self { dimensions })
    }

    /// Embed synchronously. Used by both trait methods.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let words = tokenize(text);

        for word in &words {
            self.accumulate(&mut vector, word.as_bytes(), UNIGRAM_WEIGHT);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        if !l2_normalize(&mut vector) {
            // No features, or every feature cancelled out.
            vector.iter_mut().for_each(|v| *v = 0.0);
            vector[0] = 1.0;
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let mut hasher = Sha256::new();
        hasher.update(HASH_SALT);
        hasher.update(feature);
        let digest = hasher.finalize();

        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: Self::DEFAULT_DIMENSIONS }
    }
}

/// Lower-cased alphanumeric words of `text`, in order.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!(provider = "Hashing", batch_size = texts.len(), "embedding batch");
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{dot, l2_norm};

    #[test]
    fn tokenizer_lowercases_and_drops_punctuation() {
        assert_eq!(tokenize("What is Scope 1?"), vec!["what", "is", "scope", "1"]);
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn featureless_text_maps_to_first_basis_vector() {
        let embedder = HashingEmbedder::new(8).unwrap();
        let vector = embedder.embed_sync("");
        assert_eq!(vector[0], 1.0);
        assert!((l2_norm(&vector) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_sync("What is Scope 1?");
        let direct =
            embedder.embed_sync("Scope 1 emissions are direct emissions from owned sources.");
        let indirect =
            embedder.embed_sync("Scope 2 emissions are indirect emissions from purchased energy.");
        assert!(dot(&query, &direct) > dot(&query, &indirect));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }
}
