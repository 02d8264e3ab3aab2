//! Memory items
//!
//! The unit of storage shared by both memory tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Open extension map carried by every item
pub type Metadata = serde_json::Map<String, Value>;

/// Default importance for items created without an explicit score
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Role of a message sender
///
/// Unknown roles are kept verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryRole {
    User,
    Assistant,
    System,
    Other(String),
}

impl MemoryRole {
    pub fn as_str(&self) -> &str {
        match self {
            MemoryRole::User => "user",
            MemoryRole::Assistant => "assistant",
            MemoryRole::System => "system",
            MemoryRole::Other(role) => role,
        }
    }
}

impl From<&str> for MemoryRole {
    fn from(role: &str) -> Self {
        match role {
            "user" => MemoryRole::User,
            "assistant" => MemoryRole::Assistant,
            "system" => MemoryRole::System,
            other => MemoryRole::Other(other.to_string()),
        }
    }
}

impl From<String> for MemoryRole {
    fn from(role: String) -> Self {
        MemoryRole::from(role.as_str())
    }
}

impl From<MemoryRole> for String {
    fn from(role: MemoryRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for MemoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remembered message or fact
///
/// `importance` is intended to lie in `[0, 1]` but is never clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub role: MemoryRole,
    #[serde(default)]
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
    pub importance: f64,
}

impl MemoryItem {
    /// Create a new item with a fresh id and the current time
    pub fn new(content: impl Into<String>, role: MemoryRole) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            role,
            metadata: Metadata::new(),
            timestamp: Utc::now(),
            importance: DEFAULT_IMPORTANCE,
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Content length in characters, the unit used for token budgeting
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
