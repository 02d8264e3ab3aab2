//! Feature-hashing embedder
//!
//! Deterministic and fully offline: each lowercase word is hashed with
//! SHA-256 into a signed bucket, then the vector is L2-normalised. Texts that
//! share words end up close under cosine similarity.

use crate::embedding::EmbeddingModel;
use crate::Result;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let hash = Sha256::digest(token.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&hash[..8]);
            let bucket = (u64::from_le_bytes(bytes) % self.dimension as u64) as usize;
            let sign = if hash[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait::async_trait]
impl EmbeddingModel for HashingEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalised() {
        let model = HashingEmbedding::new(64);
        let a = model.embed("Hello, World");
        let b = model.embed("hello world");
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let model = HashingEmbedding::new(256);
        let query = model.embed("database migration plan");
        let related = model.embed("the migration plan for the database");
        let unrelated = model.embed("favourite pizza toppings");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let model = HashingEmbedding::new(8);
        assert!(model.embed("").iter().all(|x| *x == 0.0));
        assert!(model.embed("  ,.;  ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let model = HashingEmbedding::new(32);
        let texts = vec!["one".to_string(), "two words".to_string()];
        let batch = model.embed_documents(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], model.embed_query("two words").await.unwrap());
        assert_eq!(model.dimension(), 32);
    }
}
