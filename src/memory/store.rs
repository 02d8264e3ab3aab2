//! Shared store contract
//!
//! Both memory tiers implement [`MemoryStore`], so callers that only need the
//! common surface can hold either one behind `&dyn MemoryStore`.

use crate::memory::item::MemoryItem;
use crate::Result;

/// Trait for a memory tier
///
/// Missing ids are not errors: `get` yields `None` and `delete` yields `false`.
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store an item and return its id
    async fn add(&self, item: MemoryItem) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>>;

    /// Tier-specific search: lexical for short-term, semantic for long-term
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryItem>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<bool>;

    /// Most recent items first
    async fn get_recent(&self, limit: usize) -> Result<Vec<MemoryItem>>;

    async fn count(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use crate::memory::item::MemoryRole;
    use crate::memory::{LongTermMemory, ShortTermMemory};
    use crate::vector_store::InMemoryVectorStore;
    use std::sync::Arc;

    async fn exercise(store: &dyn MemoryStore) {
        let first = store
            .add(MemoryItem::new("the deploy failed on friday", MemoryRole::User))
            .await
            .unwrap();
        let second = store
            .add(MemoryItem::new("rollback finished", MemoryRole::Assistant))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.get(&first).await.unwrap().unwrap().content, "the deploy failed on friday");

        let hits = store.search("deploy", 5).await.unwrap();
        assert!(hits.iter().any(|item| item.id == first));

        assert!(store.delete(&second).await.unwrap());
        assert!(store.get(&second).await.unwrap().is_none());

        assert!(store.clear().await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_term_honours_contract() {
        let store = ShortTermMemory::new(10);
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_long_term_honours_contract() {
        let store = LongTermMemory::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashingEmbedding::new(64)),
            "contract",
        );
        exercise(&store).await;
    }
}
