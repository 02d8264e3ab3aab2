//! Long-term memory
//!
//! A typed view over one vector store collection. Items are embedded on the
//! way in and rebuilt from document metadata on the way out; the collection
//! itself is created lazily with the embedder's dimension.

use crate::embedding::EmbeddingModel;
use crate::memory::item::{MemoryItem, MemoryRole, Metadata, DEFAULT_IMPORTANCE};
use crate::memory::store::MemoryStore;
use crate::vector_store::{Document, MetadataFilter, SearchResult, VectorStore};
use crate::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Importance given to consolidated and summary items
pub const CONSOLIDATED_IMPORTANCE: f64 = 0.8;

/// Metadata key carrying the owner scope
pub const OWNER_KEY: &str = "user_id";

const ROLE_KEY: &str = "role";
const TIMESTAMP_KEY: &str = "timestamp";
const IMPORTANCE_KEY: &str = "importance";

/// Persistent, semantically searchable memory
pub struct LongTermMemory {
    vector_store: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingModel>,
    collection: String,
    user_id: Option<String>,
    /// Set once the collection is known to exist; reset by `clear`
    ready: Mutex<bool>,
}

impl LongTermMemory {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingModel>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            vector_store,
            embedding,
            collection: collection.into(),
            user_id: None,
            ready: Mutex::new(false),
        }
    }

    /// Restrict inserts and searches to one owner's items
    pub fn scoped_to(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Check-then-create the backing collection until it succeeds once
    async fn ensure_collection(&self) -> Result<()> {
        let mut ready = self.ready.lock().await;
        if *ready {
            return Ok(());
        }

        if !self.vector_store.collection_exists(&self.collection).await? {
            let dimension = self.embedding.dimension();
            self.vector_store
                .create_collection(&self.collection, dimension)
                .await?;
            info!(collection = %self.collection, dimension, "Created long-term memory collection");
        }

        *ready = true;
        Ok(())
    }

    fn owner_filter(&self) -> Option<MetadataFilter> {
        self.user_id
            .as_ref()
            .map(|user_id| MetadataFilter::new().eq(OWNER_KEY, user_id.clone()))
    }

    fn item_metadata(&self, item: &MemoryItem) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(ROLE_KEY.to_string(), json!(item.role.as_str()));
        metadata.insert(TIMESTAMP_KEY.to_string(), json!(item.timestamp.to_rfc3339()));
        metadata.insert(IMPORTANCE_KEY.to_string(), importance_value(item.importance));
        for (key, value) in &item.metadata {
            metadata.insert(key.clone(), value.clone());
        }
        if let Some(user_id) = &self.user_id {
            metadata.insert(OWNER_KEY.to_string(), json!(user_id));
        }
        metadata
    }

    async fn to_documents(&self, items: &[MemoryItem]) -> Result<Vec<Document>> {
        let texts: Vec<String> = items.iter().map(|item| item.content.clone()).collect();
        let embeddings = self.embedding.embed_documents(&texts).await?;

        Ok(items
            .iter()
            .zip(embeddings)
            .map(|(item, embedding)| Document {
                id: Some(item.id.clone()),
                content: item.content.clone(),
                metadata: self.item_metadata(item),
                embedding: Some(embedding),
            })
            .collect())
    }

    pub async fn add(&self, item: MemoryItem) -> Result<String> {
        let mut ids = self.add_batch(vec![item]).await?;
        ids.pop().ok_or_else(|| {
            crate::error::MemoryError::VectorStore("insert returned no id".to_string())
        })
    }

    pub async fn add_batch(&self, items: Vec<MemoryItem>) -> Result<Vec<String>> {
        self.ensure_collection().await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.to_documents(&items).await?;
        let ids = self
            .vector_store
            .insert(&self.collection, documents)
            .await
            .inspect_err(|e| warn!(collection = %self.collection, "Long-term insert failed: {}", e))?;

        debug!(collection = %self.collection, count = ids.len(), "Stored long-term memories");
        Ok(ids)
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        self.ensure_collection().await?;
        let documents = self
            .vector_store
            .get_by_ids(&self.collection, &[id.to_string()])
            .await?;

        Ok(documents
            .into_iter()
            .next()
            .map(|document| {
                let id = document.id.unwrap_or_else(|| id.to_string());
                rebuild_item(id, document.content, document.metadata)
            }))
    }

    /// Semantic search with optional metadata filters and a score floor
    ///
    /// The owner scope, when set, overrides any caller condition on the same key.
    pub async fn search_filtered(
        &self,
        query: &str,
        limit: usize,
        filters: Option<MetadataFilter>,
        min_score: f32,
    ) -> Result<Vec<MemoryItem>> {
        self.ensure_collection().await?;

        let filter = match (filters, self.owner_filter()) {
            (Some(caller), Some(scope)) => Some(caller.merge(scope)),
            (caller, scope) => caller.or(scope),
        };

        let query_vector = self.embedding.embed_query(query).await?;
        let results = self
            .vector_store
            .search(&self.collection, &query_vector, limit, filter.as_ref())
            .await
            .inspect_err(|e| warn!(collection = %self.collection, "Long-term search failed: {}", e))?;

        Ok(results
            .into_iter()
            .filter(|result| result.score >= min_score)
            .map(|SearchResult { id, content, metadata, .. }| rebuild_item(id, content, metadata))
            .collect())
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryItem>> {
        self.search_filtered(query, limit, None, 0.0).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.ensure_collection().await?;
        self.vector_store
            .delete(&self.collection, &[id.to_string()])
            .await
    }

    /// Drop and immediately recreate the collection
    ///
    /// Destroys every document in it, including other owners' items.
    pub async fn clear(&self) -> Result<bool> {
        let mut ready = self.ready.lock().await;
        // A failure below leaves the flag down so the next call re-creates.
        *ready = false;

        self.vector_store.drop_collection(&self.collection).await?;
        self.vector_store
            .create_collection(&self.collection, self.embedding.dimension())
            .await
            .inspect_err(|e| warn!(collection = %self.collection, "Failed to recreate collection: {}", e))?;

        *ready = true;
        info!(collection = %self.collection, "Cleared long-term memory");
        Ok(true)
    }

    /// Approximate recency query
    ///
    /// The store has no recency index, so this runs an unfiltered search over
    /// `2 * limit` candidates and sorts them client-side. Items outside that
    /// candidate set are never considered.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<MemoryItem>> {
        let mut items = self.search("", limit.saturating_mul(2)).await?;
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(limit);
        Ok(items)
    }

    pub async fn get_by_importance(
        &self,
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        let filter = MetadataFilter::new().gte(IMPORTANCE_KEY, min_importance);
        self.search_filtered("", limit, Some(filter), 0.0).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.ensure_collection().await?;
        self.vector_store.count(&self.collection).await
    }

    /// Replace `items` with a single summary item
    ///
    /// Not atomic: the summary is stored first, then sources are deleted one by
    /// one. A failure part-way leaves the summary plus the undeleted sources.
    pub async fn consolidate(&self, items: &[MemoryItem], summary: &str) -> Result<String> {
        let source_ids: Vec<Value> = items.iter().map(|item| json!(item.id)).collect();

        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), json!("consolidated"));
        metadata.insert("source_ids".to_string(), Value::Array(source_ids));

        let consolidated = MemoryItem::new(summary, MemoryRole::System)
            .with_importance(CONSOLIDATED_IMPORTANCE)
            .with_metadata(metadata);

        let new_id = self.add(consolidated).await?;

        for item in items {
            self.delete(&item.id).await?;
        }

        info!(
            consolidated_id = %new_id,
            sources = items.len(),
            "Consolidated long-term memories"
        );
        Ok(new_id)
    }
}

/// JSON has no NaN or infinity, so those are stored as their string form
fn importance_value(importance: f64) -> Value {
    if importance.is_finite() {
        json!(importance)
    } else {
        Value::String(importance.to_string())
    }
}

/// Move role, timestamp and importance out of raw metadata into typed fields
fn rebuild_item(id: String, content: String, mut metadata: Metadata) -> MemoryItem {
    let role = metadata
        .remove(ROLE_KEY)
        .and_then(|value| value.as_str().map(MemoryRole::from))
        .unwrap_or(MemoryRole::User);

    let timestamp = metadata
        .remove(TIMESTAMP_KEY)
        .and_then(|value| {
            value
                .as_str()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        })
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let importance = metadata
        .remove(IMPORTANCE_KEY)
        .and_then(|value| {
            value
                .as_f64()
                .or_else(|| value.as_str().and_then(|raw| raw.parse().ok()))
        })
        .unwrap_or(DEFAULT_IMPORTANCE);

    MemoryItem {
        id,
        content,
        role,
        metadata,
        timestamp,
        importance,
    }
}

#[async_trait::async_trait]
impl MemoryStore for LongTermMemory {
    async fn add(&self, item: MemoryItem) -> Result<String> {
        LongTermMemory::add(self, item).await
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        LongTermMemory::get(self, id).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryItem>> {
        LongTermMemory::search(self, query, limit).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        LongTermMemory::delete(self, id).await
    }

    async fn clear(&self) -> Result<bool> {
        LongTermMemory::clear(self).await
    }

    async fn get_recent(&self, limit: usize) -> Result<Vec<MemoryItem>> {
        LongTermMemory::get_recent(self, limit).await
    }

    async fn count(&self) -> Result<usize> {
        LongTermMemory::count(self).await
    }
}
