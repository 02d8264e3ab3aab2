//! Text embedding contract
//!
//! Long-term memory embeds item content and queries through [`EmbeddingModel`].

pub mod hashing;

pub use crate::gemini::GeminiEmbedding;
pub use hashing::HashingEmbedding;

use crate::Result;

/// Trait for a text embedding model
#[async_trait::async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this model produces
    fn dimension(&self) -> usize;
}
