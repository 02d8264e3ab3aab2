//! Memory manager
//!
//! The single entry point for a session's memory. Decides what is promoted
//! from short-term to long-term memory, builds token-budgeted history, merges
//! searches across tiers and asks a text generator for summaries.
//!
//! Cross-tier writes are best-effort: the manager never rolls back one tier
//! because the other failed.

use crate::config::DEFAULT_ARCHIVE_THRESHOLD;
use crate::llm::{ChatMessage, TextGenerator};
use crate::memory::item::{MemoryItem, MemoryRole, Metadata, DEFAULT_IMPORTANCE};
use crate::memory::long_term::{LongTermMemory, CONSOLIDATED_IMPORTANCE};
use crate::memory::short_term::ShortTermMemory;
use crate::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default importance floor for explicit archival
///
/// Lower than the auto-archive default of 0.6.
pub const DEFAULT_ARCHIVE_IMPORTANCE: f64 = 0.5;

/// Output cap for summarization requests
pub const SUMMARY_MAX_TOKENS: u32 = 500;

const SUMMARY_INSTRUCTION: &str =
    "Summarize the following conversation concisely, capturing key points and decisions.";

/// Context drawn from both tiers for one query
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelevantContext {
    pub short_term: Vec<MemoryItem>,
    pub long_term: Vec<MemoryItem>,
}

/// Point-in-time counts for both tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub short_term_count: usize,
    pub long_term_count: usize,
    pub short_term_max_size: usize,
}

/// Coordinates short-term and long-term memory for one session
pub struct MemoryManager {
    short_term: ShortTermMemory,
    long_term: LongTermMemory,
    llm: Option<Arc<dyn TextGenerator>>,
    auto_archive: bool,
    archive_threshold: f64,
}

impl MemoryManager {
    pub fn new(short_term: ShortTermMemory, long_term: LongTermMemory) -> Self {
        Self {
            short_term,
            long_term,
            llm: None,
            auto_archive: true,
            archive_threshold: DEFAULT_ARCHIVE_THRESHOLD,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn TextGenerator>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_auto_archive(mut self, auto_archive: bool, archive_threshold: f64) -> Self {
        self.auto_archive = auto_archive;
        self.archive_threshold = archive_threshold;
        self
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    pub fn long_term(&self) -> &LongTermMemory {
        &self.long_term
    }

    /// Record a message
    ///
    /// Always lands in short-term memory. When auto-archival is on and
    /// `importance >= archive_threshold` a copy also goes to long-term memory;
    /// if that write fails the error is returned but the short-term write stays.
    pub async fn add_message(
        &self,
        content: impl Into<String>,
        role: MemoryRole,
        importance: f64,
        metadata: Option<Metadata>,
    ) -> Result<String> {
        let mut item = MemoryItem::new(content, role)
            .with_importance(importance)
            .with_metadata(metadata.unwrap_or_default());
        // Both tiers get the same session-tagged copy.
        self.short_term.tag(&mut item);

        let id = self.short_term.add(item.clone()).await;

        if self.auto_archive && importance >= self.archive_threshold {
            debug!(item_id = %id, importance, "Auto-archiving message to long-term memory");
            self.long_term.add(item).await.inspect_err(|e| {
                warn!(item_id = %id, "Auto-archive failed, short-term copy kept: {}", e)
            })?;
        }

        Ok(id)
    }

    /// Record a user message followed by the assistant reply
    pub async fn add_conversation_turn(
        &self,
        user_message: impl Into<String>,
        assistant_message: impl Into<String>,
        user_metadata: Option<Metadata>,
        assistant_metadata: Option<Metadata>,
    ) -> Result<(String, String)> {
        let user_id = self
            .add_message(user_message, MemoryRole::User, DEFAULT_IMPORTANCE, user_metadata)
            .await?;
        let assistant_id = self
            .add_message(
                assistant_message,
                MemoryRole::Assistant,
                DEFAULT_IMPORTANCE,
                assistant_metadata,
            )
            .await?;
        Ok((user_id, assistant_id))
    }

    /// Recent history for a generator prompt, oldest first
    ///
    /// `max_turns` keeps the last `2 * max_turns` messages, which only lines up
    /// with real turns when roles strictly alternate.
    pub async fn get_conversation_history(
        &self,
        max_turns: Option<usize>,
        max_tokens: usize,
    ) -> Vec<ChatMessage> {
        let mut items = self.short_term.get_context_window(max_tokens).await;

        if let Some(turns) = max_turns {
            let keep = turns.saturating_mul(2);
            if items.len() > keep {
                items.drain(..items.len() - keep);
            }
        }

        items
            .into_iter()
            .map(|item| ChatMessage::new(item.role, item.content))
            .collect()
    }

    /// Search both tiers and merge by recency
    ///
    /// Lexical and semantic scores are not comparable, so results are ordered
    /// by timestamp only. A short-term hit wins over a long-term hit with the
    /// same id.
    pub async fn search_all(
        &self,
        query: &str,
        limit: usize,
        include_short_term: bool,
        include_long_term: bool,
    ) -> Result<Vec<MemoryItem>> {
        let mut results = Vec::new();

        if include_short_term {
            results.extend(self.short_term.search(query, limit).await);
        }

        if include_long_term {
            let mut seen: HashSet<String> = results.iter().map(|item| item.id.clone()).collect();
            for item in self.long_term.search(query, limit).await? {
                if seen.insert(item.id.clone()) {
                    results.push(item);
                }
            }
        }

        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(limit);
        Ok(results)
    }

    /// Most recent short-term items alongside a long-term search for `query`
    ///
    /// The two lists are independent and may overlap.
    pub async fn get_relevant_context(
        &self,
        query: &str,
        short_term_count: usize,
        long_term_count: usize,
    ) -> Result<RelevantContext> {
        let short_term = self.short_term.get_recent(short_term_count).await;
        let long_term = self.long_term.search(query, long_term_count).await?;
        Ok(RelevantContext {
            short_term,
            long_term,
        })
    }

    /// Copy short-term items into long-term memory
    ///
    /// With `item_ids` every named item still in the buffer is copied;
    /// otherwise items with `importance >= importance_threshold` are. Short-term
    /// memory is left untouched. Returns how many items were copied.
    pub async fn archive_to_long_term(
        &self,
        item_ids: Option<&[String]>,
        importance_threshold: f64,
    ) -> Result<usize> {
        let mut archived = 0;

        for item in self.short_term.get_all().await {
            let selected = match item_ids {
                Some(ids) => ids.contains(&item.id),
                None => item.importance >= importance_threshold,
            };
            if !selected {
                continue;
            }
            self.long_term.add(item).await?;
            archived += 1;
        }

        info!(archived, "Archived short-term memories to long-term memory");
        Ok(archived)
    }

    /// Summarize the most recent messages into one long-term item
    ///
    /// Returns `None` when no generator is configured or there is nothing to
    /// summarize. Generator errors are returned as-is.
    pub async fn summarize_and_archive(&self, max_items: usize) -> Result<Option<String>> {
        let Some(llm) = &self.llm else {
            debug!("No text generator configured, skipping summarization");
            return Ok(None);
        };

        let items = self.short_term.get_recent(max_items).await;
        if items.is_empty() {
            return Ok(None);
        }

        let transcript = format_transcript(&items);
        let messages = vec![
            ChatMessage::system(SUMMARY_INSTRUCTION),
            ChatMessage::user(transcript),
        ];

        info!("Summarizing {} recent messages", items.len());

        let summary = llm
            .generate(&messages, SUMMARY_MAX_TOKENS)
            .await
            .inspect_err(|e| warn!("Failed to summarize conversation: {}", e))?;

        let source_ids: Vec<Value> = items.iter().map(|item| json!(item.id)).collect();
        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), json!("summary"));
        metadata.insert("source_count".to_string(), json!(items.len()));
        metadata.insert("source_ids".to_string(), Value::Array(source_ids));

        let summary_item = MemoryItem::new(summary, MemoryRole::System)
            .with_importance(CONSOLIDATED_IMPORTANCE)
            .with_metadata(metadata);

        let id = self.long_term.add(summary_item).await?;
        info!(summary_id = %id, "Stored conversation summary");
        Ok(Some(id))
    }

    pub async fn clear_short_term(&self) -> bool {
        self.short_term.clear().await;
        true
    }

    /// Clear both tiers; a long-term failure leaves short-term already cleared
    pub async fn clear_all(&self) -> Result<bool> {
        self.short_term.clear().await;
        self.long_term.clear().await?;
        Ok(true)
    }

    pub async fn get_stats(&self) -> Result<MemoryStats> {
        Ok(MemoryStats {
            short_term_count: self.short_term.count().await,
            long_term_count: self.long_term.count().await?,
            short_term_max_size: self.short_term.max_size(),
        })
    }
}

/// Flatten items into `role: content` lines in the order given
fn format_transcript(items: &[MemoryItem]) -> String {
    items
        .iter()
        .map(|item| format!("{}: {}", item.role, item.content))
        .collect::<Vec<_>>()
        .join("\n")
}
