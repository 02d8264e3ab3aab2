//! Agent Memory
//!
//! Conversation memory for LLM agents:
//! - A bounded short-term buffer holding the live conversation
//! - Vector-backed long-term memory with semantic search
//! - A manager that promotes important messages, builds token-budgeted
//!   history and summarizes conversations through a text generator
//! - Per-session managers with idle expiry
//!
//! Collaborators (vector store, embedding model, text generator) sit behind
//! traits; in-memory, hashing and Gemini implementations ship with the crate.

pub mod config;
pub mod embedding;
pub mod error;
pub mod gemini;
pub mod llm;
pub mod memory;
pub mod vector_store;

pub use error::{MemoryError, Result};

// Re-export common types
pub use config::MemoryConfig;
pub use embedding::{EmbeddingModel, HashingEmbedding};
pub use llm::{ChatMessage, TextGenerator};
pub use memory::{
    LongTermMemory, MemoryItem, MemoryManager, MemoryRole, MemoryServices, MemoryStore,
    SessionStore, ShortTermMemory,
};
pub use vector_store::{InMemoryVectorStore, MetadataFilter, VectorStore};
