//! In-memory vector store
//!
//! Brute-force cosine similarity over named collections. Suitable for tests,
//! local runs and small deployments; data is lost on restart.

use crate::error::MemoryError;
use crate::vector_store::{Document, MetadataFilter, SearchResult, VectorStore};
use crate::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct Collection {
    dimension: usize,
    /// Insertion order is kept so equal scores rank deterministically
    documents: Vec<StoredDocument>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    document: Document,
    embedding: Vec<f32>,
}

impl Collection {
    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|stored| stored.id == id)
    }
}

/// Thread-safe in-memory vector store
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cosine similarity; zero for empty or zero-norm vectors
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(MemoryError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<bool> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert_with(|| {
            debug!(collection = name, dimension, "created collection");
            Collection {
                dimension,
                documents: Vec::new(),
            }
        });
        Ok(true)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let removed = self.collections.write().await.remove(name);
        Ok(removed.is_some())
    }

    async fn insert(&self, name: &str, documents: Vec<Document>) -> Result<Vec<String>> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| MemoryError::CollectionNotFound(name.to_string()))?;

        // Validate everything before touching the collection.
        let mut prepared = Vec::with_capacity(documents.len());
        for mut document in documents {
            let embedding = document.embedding.clone().ok_or_else(|| {
                MemoryError::VectorStore("document inserted without an embedding".to_string())
            })?;
            check_dimension(collection.dimension, embedding.len())?;

            let id = document
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            document.id = Some(id.clone());
            prepared.push(StoredDocument {
                id,
                document,
                embedding,
            });
        }

        let mut ids = Vec::with_capacity(prepared.len());
        for stored in prepared {
            ids.push(stored.id.clone());
            match collection.position(&stored.id) {
                Some(position) => collection.documents[position] = stored,
                None => collection.documents.push(stored),
            }
        }

        Ok(ids)
    }

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| MemoryError::CollectionNotFound(name.to_string()))?;
        check_dimension(collection.dimension, query_vector.len())?;
        let filter = filter.filter(|f| !f.is_empty());

        let mut scored: Vec<(f32, &StoredDocument)> = collection
            .documents
            .iter()
            .filter(|stored| filter.map_or(true, |f| f.matches(&stored.document.metadata)))
            .map(|stored| (Self::cosine_similarity(query_vector, &stored.embedding), stored))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, stored)| SearchResult {
                id: stored.id.clone(),
                content: stored.document.content.clone(),
                metadata: stored.document.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| MemoryError::CollectionNotFound(name.to_string()))?;

        let before = collection.documents.len();
        collection
            .documents
            .retain(|stored| !ids.contains(&stored.id));
        Ok(collection.documents.len() < before)
    }

    async fn get_by_ids(&self, name: &str, ids: &[String]) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| MemoryError::CollectionNotFound(name.to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| collection.position(id))
            .map(|position| collection.documents[position].document.clone())
            .collect())
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(name)
            .map(|collection| collection.documents.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Metadata;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn doc(id: Option<&str>, content: &str, embedding: Vec<f32>, metadata: Metadata) -> Document {
        Document {
            id: id.map(str::to_string),
            content: content.to_string(),
            metadata,
            embedding: Some(embedding),
        }
    }

    fn meta(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((InMemoryVectorStore::cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(InMemoryVectorStore::cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(InMemoryVectorStore::cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(InMemoryVectorStore::cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("c").await.unwrap());
        assert_ok!(store.create_collection("c", 2).await);
        assert_ok!(store.create_collection("c", 2).await);
        assert!(store.collection_exists("c").await.unwrap());
        assert!(store.drop_collection("c").await.unwrap());
        assert!(!store.drop_collection("c").await.unwrap());
        assert_eq!(store.count("c").await.unwrap(), 0);
        assert_err!(store.search("c", &[1.0, 0.0], 1, None).await);
    }

    #[tokio::test]
    async fn test_insert_search_and_filter() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();

        let ids = store
            .insert(
                "c",
                vec![
                    doc(Some("a"), "east", vec![1.0, 0.0], meta(json!({ "importance": 0.9 }))),
                    doc(Some("b"), "north", vec![0.0, 1.0], meta(json!({ "importance": 0.2 }))),
                    doc(None, "north-east", vec![1.0, 1.0], meta(json!({ "importance": 0.5 }))),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(&ids[..2], &["a".to_string(), "b".to_string()]);
        assert_eq!(store.count("c").await.unwrap(), 3);

        let hits = store.search("c", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].content, "north-east");
        assert!(hits[0].score >= hits[1].score);

        let filter = MetadataFilter::new().gte("importance", 0.5);
        let hits = store.search("c", &[0.0, 1.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.id != "b"));

        let everything = MetadataFilter::new();
        let hits = store.search("c", &[0.0, 1.0], 10, Some(&everything)).await.unwrap();
        assert_eq!(hits.len(), 3);

        let band = MetadataFilter::new().gte("importance", 0.3).lte("importance", 0.6);
        let hits = store.search("c", &[0.0, 1.0], 10, Some(&band)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "north-east");
    }

    #[tokio::test]
    async fn test_insert_upserts_by_id() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .insert("c", vec![doc(Some("a"), "old", vec![1.0, 0.0], Metadata::new())])
            .await
            .unwrap();
        store
            .insert("c", vec![doc(Some("a"), "new", vec![1.0, 0.0], Metadata::new())])
            .await
            .unwrap();

        assert_eq!(store.count("c").await.unwrap(), 1);
        let docs = store.get_by_ids("c", &["a".to_string()]).await.unwrap();
        assert_eq!(docs[0].content, "new");
    }

    #[tokio::test]
    async fn test_dimension_and_missing_collection_errors() {
        let store = InMemoryVectorStore::new();
        let err = store
            .insert("nope", vec![doc(None, "x", vec![1.0], Metadata::new())])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::CollectionNotFound(_)));

        store.create_collection("c", 3).await.unwrap();
        let err = store
            .insert("c", vec![doc(None, "x", vec![1.0], Metadata::new())])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 3, actual: 1 }));
        assert_err!(store.search("c", &[1.0, 0.0], 1, None).await);
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_get_by_ids() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 1).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc(Some("a"), "a", vec![1.0], Metadata::new()),
                    doc(Some("b"), "b", vec![1.0], Metadata::new()),
                ],
            )
            .await
            .unwrap();

        let docs = store
            .get_by_ids("c", &["b".to_string(), "zzz".to_string(), "a".to_string()])
            .await
            .unwrap();
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "a"]);

        assert!(store.delete("c", &["a".to_string()]).await.unwrap());
        assert!(!store.delete("c", &["a".to_string()]).await.unwrap());
        assert_eq!(store.count("c").await.unwrap(), 1);
    }
}
