//! Per-session memory managers
//!
//! Each conversation gets its own [`MemoryManager`]: a private short-term
//! buffer plus a long-term view scoped to the user, all sharing one set of
//! collaborators. Idle sessions expire after a TTL and the least recently
//! used session is evicted when the store is full.

use crate::config::MemoryConfig;
use crate::embedding::EmbeddingModel;
use crate::llm::TextGenerator;
use crate::memory::long_term::LongTermMemory;
use crate::memory::manager::MemoryManager;
use crate::memory::short_term::ShortTermMemory;
use crate::vector_store::VectorStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

const ANONYMOUS_USER: &str = "anonymous";

/// Collaborators shared by every session
#[derive(Clone)]
pub struct MemoryServices {
    pub vector_store: Arc<dyn VectorStore>,
    pub embedding: Arc<dyn EmbeddingModel>,
    pub llm: Option<Arc<dyn TextGenerator>>,
    pub config: MemoryConfig,
}

impl MemoryServices {
    /// Assemble a manager for one conversation
    pub fn build_manager(&self, session_id: &str, user_id: Option<&str>) -> MemoryManager {
        let short_term =
            ShortTermMemory::with_session(self.config.short_term_memory_size, session_id);

        let mut long_term = LongTermMemory::new(
            self.vector_store.clone(),
            self.embedding.clone(),
            self.config.long_term_memory_collection.clone(),
        );
        if let Some(user_id) = user_id {
            long_term = long_term.scoped_to(user_id);
        }

        let manager = MemoryManager::new(short_term, long_term)
            .with_auto_archive(self.config.auto_archive, self.config.archive_threshold);

        match &self.llm {
            Some(llm) => manager.with_llm(llm.clone()),
            None => manager,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    session_id: String,
    user_id: String,
}

impl SessionKey {
    fn new(session_id: &str, user_id: Option<&str>) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.unwrap_or(ANONYMOUS_USER).to_string(),
        }
    }
}

struct SessionEntry {
    manager: Arc<MemoryManager>,
    last_access: Instant,
}

/// Keeps one live [`MemoryManager`] per (session, user) pair
pub struct SessionStore {
    services: MemoryServices,
    ttl: Duration,
    max_sessions: usize,
    sessions: RwLock<HashMap<SessionKey, SessionEntry>>,
}

impl SessionStore {
    pub fn new(services: MemoryServices) -> Self {
        let ttl = services.config.session_ttl;
        let max_sessions = services.config.max_sessions.max(1);
        Self {
            services,
            ttl,
            max_sessions,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session's manager, creating it on first use
    ///
    /// Touching a session refreshes its TTL. An expired session is replaced by
    /// a fresh manager with an empty short-term buffer.
    pub async fn get_or_create(&self, session_id: &str, user_id: Option<&str>) -> Arc<MemoryManager> {
        let key = SessionKey::new(session_id, user_id);
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        if let Some(entry) = sessions.get_mut(&key) {
            if now.duration_since(entry.last_access) < self.ttl {
                entry.last_access = now;
                return entry.manager.clone();
            }
        }

        Self::drop_expired(&mut sessions, now, self.ttl);

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(session_id = %oldest.session_id, "Session store full, evicting least recently used session");
                sessions.remove(&oldest);
            }
        }

        let manager = Arc::new(self.services.build_manager(session_id, user_id));
        sessions.insert(
            key,
            SessionEntry {
                manager: manager.clone(),
                last_access: now,
            },
        );

        info!(session_id, user_id = user_id.unwrap_or(ANONYMOUS_USER), "Created session memory");
        manager
    }

    /// Forget a session; its long-term memories are untouched
    pub async fn remove(&self, session_id: &str, user_id: Option<&str>) -> bool {
        let key = SessionKey::new(session_id, user_id);
        self.sessions.write().await.remove(&key).is_some()
    }

    /// Drop every session idle for longer than the TTL, returning how many went
    pub async fn evict_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let evicted = Self::drop_expired(&mut sessions, Instant::now(), self.ttl);
        if evicted > 0 {
            info!(evicted, "Evicted expired sessions");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn drop_expired(
        sessions: &mut HashMap<SessionKey, SessionEntry>,
        now: Instant,
        ttl: Duration,
    ) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_access) < ttl);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use crate::memory::MemoryRole;
    use crate::vector_store::InMemoryVectorStore;

    fn store(ttl_secs: u64, max_sessions: usize) -> SessionStore {
        let config = MemoryConfig {
            short_term_memory_size: 5,
            session_ttl: Duration::from_secs(ttl_secs),
            max_sessions,
            ..MemoryConfig::default()
        };
        SessionStore::new(MemoryServices {
            vector_store: Arc::new(InMemoryVectorStore::new()),
            embedding: Arc::new(HashingEmbedding::new(64)),
            llm: None,
            config,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_session_reuses_manager() {
        let store = store(60, 10);
        let first = store.get_or_create("s1", Some("alice")).await;
        first
            .add_message("hello", MemoryRole::User, 0.1, None)
            .await
            .unwrap();

        let again = store.get_or_create("s1", Some("alice")).await;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.short_term().count().await, 1);

        let other_user = store.get_or_create("s1", Some("bob")).await;
        assert!(!Arc::ptr_eq(&first, &other_user));
        assert_eq!(other_user.short_term().count().await, 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_is_configured_for_session() {
        let store = store(60, 10);
        let manager = store.get_or_create("chat-9", Some("carol")).await;

        assert_eq!(manager.short_term().session_id(), Some("chat-9"));
        assert_eq!(manager.short_term().max_size(), 5);
        assert_eq!(manager.long_term().user_id(), Some("carol"));

        let anonymous = store.get_or_create("chat-9", None).await;
        assert_eq!(anonymous.long_term().user_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_term_is_shared_but_scoped() {
        let store = store(60, 10);
        let alice = store.get_or_create("s1", Some("alice")).await;
        alice
            .add_message("alice likes green tea", MemoryRole::User, 0.9, None)
            .await
            .unwrap();

        let alice_elsewhere = store.get_or_create("s2", Some("alice")).await;
        let hits = alice_elsewhere.long_term().search("green tea", 5).await.unwrap();
        assert_eq!(hits.len(), 1);

        let bob = store.get_or_create("s1", Some("bob")).await;
        assert!(bob.long_term().search("green tea", 5).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let store = store(60, 10);
        let first = store.get_or_create("s1", None).await;
        store.get_or_create("s2", None).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        store.get_or_create("s2", None).await;

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.evict_expired().await, 1);
        assert_eq!(store.len().await, 1);

        let replaced = store.get_or_create("s1", None).await;
        assert!(!Arc::ptr_eq(&first, &replaced));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_store_evicts_least_recently_used() {
        let store = store(3600, 2);
        let a = store.get_or_create("a", None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.get_or_create("b", None).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        store.get_or_create("a", None).await;
        tokio::time::advance(Duration::from_secs(1)).await;

        store.get_or_create("c", None).await;
        assert_eq!(store.len().await, 2);

        let a_again = store.get_or_create("a", None).await;
        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!store.remove("b", None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let store = store(60, 10);
        store.get_or_create("s1", Some("alice")).await;
        assert!(store.remove("s1", Some("alice")).await);
        assert!(!store.remove("s1", Some("alice")).await);
        assert!(store.is_empty().await);
    }
}
