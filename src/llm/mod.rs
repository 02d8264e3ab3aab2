//! Text generation contract

use crate::memory::MemoryRole;
use crate::Result;
use serde::{Deserialize, Serialize};

pub use crate::gemini::GeminiClient;

/// A chat turn handed to a text generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MemoryRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MemoryRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MemoryRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MemoryRole::User, content)
    }
}

/// Trait for a text-generation model
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a reply to `messages`, capped at roughly `max_tokens` output tokens
    async fn generate(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String>;
}
