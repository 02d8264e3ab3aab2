//! Vector store contract
//!
//! Long-term memory talks to its backing engine only through [`VectorStore`].
//! Indexing and persistence are the engine's business.

pub mod in_memory;

pub use in_memory::InMemoryVectorStore;

use crate::memory::Metadata;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A document as stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Assigned by the store when absent
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
}

/// A similarity hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub score: f32,
}

/// Predicate on a single metadata field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Gte(f64),
    Lte(f64),
}

impl Condition {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Condition::Eq(expected), Some(actual)) => expected == actual,
            (Condition::Gte(bound), Some(actual)) => {
                actual.as_f64().is_some_and(|number| number >= *bound)
            }
            (Condition::Lte(bound), Some(actual)) => {
                actual.as_f64().is_some_and(|number| number <= *bound)
            }
            (_, None) => false,
        }
    }
}

/// Conjunction of per-field conditions over document metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, Condition>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(key.into(), Condition::Eq(value.into()));
        self
    }

    pub fn gte(mut self, key: impl Into<String>, bound: f64) -> Self {
        self.conditions.insert(key.into(), Condition::Gte(bound));
        self
    }

    pub fn lte(mut self, key: impl Into<String>, bound: f64) -> Self {
        self.conditions.insert(key.into(), Condition::Lte(bound));
        self
    }

    /// Add every condition from `other`; on a key clash `other` wins
    pub fn merge(mut self, other: MetadataFilter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Condition> {
        self.conditions.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, condition)| condition.matches(metadata.get(key)))
    }
}

/// Trait for a vector database holding named collections
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection; succeeds if it already exists
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<bool>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn drop_collection(&self, name: &str) -> Result<bool>;

    /// Insert (or replace) documents and return their ids
    async fn insert(&self, name: &str, documents: Vec<Document>) -> Result<Vec<String>>;

    /// Top-k most similar documents matching `filter`, best first
    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>>;

    /// Returns `false` when none of the ids were present
    async fn delete(&self, name: &str, ids: &[String]) -> Result<bool>;

    async fn get_by_ids(&self, name: &str, ids: &[String]) -> Result<Vec<Document>>;

    async fn count(&self, name: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_conditions() {
        let meta = metadata(json!({ "user_id": "u1", "importance": 0.7 }));

        assert!(MetadataFilter::new().matches(&meta));
        assert!(MetadataFilter::new().eq("user_id", "u1").matches(&meta));
        assert!(!MetadataFilter::new().eq("user_id", "u2").matches(&meta));
        assert!(MetadataFilter::new().gte("importance", 0.7).matches(&meta));
        assert!(!MetadataFilter::new().gte("importance", 0.8).matches(&meta));
        assert!(MetadataFilter::new().lte("importance", 0.7).matches(&meta));
        assert!(!MetadataFilter::new().gte("missing", 0.0).matches(&meta));
        assert!(!MetadataFilter::new().gte("user_id", 0.0).matches(&meta));
    }

    #[test]
    fn test_merge_prefers_other() {
        let caller = MetadataFilter::new().eq("user_id", "spoofed").gte("importance", 0.5);
        let scope = MetadataFilter::new().eq("user_id", "owner");
        let merged = caller.merge(scope);

        assert_eq!(merged.get("user_id"), Some(&Condition::Eq(json!("owner"))));
        assert_eq!(merged.get("importance"), Some(&Condition::Gte(0.5)));
    }
}
