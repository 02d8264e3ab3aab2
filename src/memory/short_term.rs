//! Short-term memory
//!
//! A bounded FIFO window over the most recent items of one session. The
//! buffer and its id index live behind a single lock and are always mutated
//! together.

use crate::llm::ChatMessage;
use crate::memory::item::{MemoryItem, MemoryRole};
use crate::memory::store::MemoryStore;
use crate::Result;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// Approximate characters per token used for context budgeting
pub const CHARS_PER_TOKEN: usize = 4;

/// Ring of items plus an id → absolute slot index.
///
/// Slot numbers grow monotonically; `base` is the slot of the front item, so
/// the deque position of an id is `slot - base`.
#[derive(Debug, Default)]
struct Window {
    items: VecDeque<MemoryItem>,
    index: HashMap<String, usize>,
    base: usize,
}

impl Window {
    fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|slot| slot - self.base)
    }

    fn evict_oldest(&mut self) -> Option<MemoryItem> {
        let evicted = self.items.pop_front()?;
        self.index.remove(&evicted.id);
        self.base += 1;
        Some(evicted)
    }

    fn remove(&mut self, id: &str) -> Option<MemoryItem> {
        let position = self.position(id)?;
        self.index.remove(id);
        let removed = self.items.remove(position)?;

        // Everything behind the hole shifts one slot forward.
        for item in self.items.iter().skip(position) {
            if let Some(slot) = self.index.get_mut(&item.id) {
                *slot -= 1;
            }
        }

        Some(removed)
    }

    fn push(&mut self, item: MemoryItem) {
        let slot = self.base + self.items.len();
        self.index.insert(item.id.clone(), slot);
        self.items.push_back(item);
    }

    fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
        self.base = 0;
    }
}

/// Bounded, in-process recent-context buffer
pub struct ShortTermMemory {
    max_size: usize,
    session_id: Option<String>,
    window: RwLock<Window>,
}

impl ShortTermMemory {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            session_id: None,
            window: RwLock::new(Window::default()),
        }
    }

    /// Create a buffer that stamps `session_id` into every added item's metadata
    pub fn with_session(max_size: usize, session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::new(max_size)
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Stamp this buffer's session id into the item's metadata
    pub(crate) fn tag(&self, item: &mut MemoryItem) {
        if let Some(session_id) = &self.session_id {
            item.metadata
                .insert("session_id".to_string(), Value::String(session_id.clone()));
        }
    }

    /// Append an item, evicting the oldest one first when full
    ///
    /// With a capacity of zero the item is dropped straight away; its id is
    /// still returned.
    pub async fn add(&self, mut item: MemoryItem) -> String {
        self.tag(&mut item);
        let id = item.id.clone();

        if self.max_size == 0 {
            debug!(item_id = %id, "short-term capacity is zero, item dropped");
            return id;
        }

        let mut window = self.window.write().await;

        // Re-adding an id replaces the earlier copy.
        window.remove(&id);

        if window.items.len() >= self.max_size {
            if let Some(evicted) = window.evict_oldest() {
                debug!(evicted_id = %evicted.id, "short-term memory full, evicted oldest item");
            }
        }

        window.push(item);
        id
    }

    pub async fn add_user_message(&self, content: impl Into<String>) -> String {
        self.add(MemoryItem::new(content, MemoryRole::User)).await
    }

    pub async fn add_assistant_message(&self, content: impl Into<String>) -> String {
        self.add(MemoryItem::new(content, MemoryRole::Assistant)).await
    }

    pub async fn get(&self, id: &str) -> Option<MemoryItem> {
        let window = self.window.read().await;
        window
            .position(id)
            .and_then(|position| window.items.get(position))
            .cloned()
    }

    /// Case-insensitive substring search, newest first
    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryItem> {
        let needle = query.to_lowercase();
        let window = self.window.read().await;

        window
            .items
            .iter()
            .rev()
            .filter(|item| item.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut window = self.window.write().await;
        window.remove(id).is_some()
    }

    pub async fn clear(&self) {
        self.window.write().await.clear();
    }

    /// Most recent items first
    pub async fn get_recent(&self, limit: usize) -> Vec<MemoryItem> {
        let window = self.window.read().await;
        window.items.iter().rev().take(limit).cloned().collect()
    }

    /// Every item, oldest first
    pub async fn get_all(&self) -> Vec<MemoryItem> {
        let window = self.window.read().await;
        window.items.iter().cloned().collect()
    }

    /// Newest items whose combined content fits in `max_tokens * 4` characters
    ///
    /// Selection stops at the first item that would overflow the budget, even
    /// if older, shorter items would still fit. The result is oldest first.
    pub async fn get_context_window(&self, max_tokens: usize) -> Vec<MemoryItem> {
        let char_limit = max_tokens.saturating_mul(CHARS_PER_TOKEN);
        let window = self.window.read().await;

        let mut selected = Vec::new();
        let mut total_chars = 0usize;

        for item in window.items.iter().rev() {
            let len = item.char_len();
            if total_chars + len > char_limit {
                break;
            }
            total_chars += len;
            selected.push(item.clone());
        }

        selected.reverse();
        selected
    }

    pub async fn count(&self) -> usize {
        self.window.read().await.items.len()
    }

    /// Render the buffer as chat messages, oldest first
    pub async fn to_messages(&self) -> Vec<ChatMessage> {
        let window = self.window.read().await;
        window
            .items
            .iter()
            .map(|item| ChatMessage::new(item.role.clone(), item.content.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl MemoryStore for ShortTermMemory {
    async fn add(&self, item: MemoryItem) -> Result<String> {
        Ok(ShortTermMemory::add(self, item).await)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        Ok(ShortTermMemory::get(self, id).await)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryItem>> {
        Ok(ShortTermMemory::search(self, query, limit).await)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(ShortTermMemory::delete(self, id).await)
    }

    async fn clear(&self) -> Result<bool> {
        ShortTermMemory::clear(self).await;
        Ok(true)
    }

    async fn get_recent(&self, limit: usize) -> Result<Vec<MemoryItem>> {
        Ok(ShortTermMemory::get_recent(self, limit).await)
    }

    async fn count(&self) -> Result<usize> {
        Ok(ShortTermMemory::count(self).await)
    }
}
