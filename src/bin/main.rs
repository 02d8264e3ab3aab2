use agent_memory::{
    embedding::{EmbeddingModel, GeminiEmbedding, HashingEmbedding},
    llm::{GeminiClient, TextGenerator},
    memory::{MemoryRole, MemoryServices, MemoryStore, SessionStore},
    InMemoryVectorStore, MemoryConfig, MetadataFilter,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = MemoryConfig::from_env()?;
    info!(
        short_term_size = config.short_term_memory_size,
        collection = %config.long_term_memory_collection,
        "Memory demo starting"
    );

    let embedding: Arc<dyn EmbeddingModel>;
    let mut llm: Option<Arc<dyn TextGenerator>> = None;
    match &config.gemini_api_key {
        Some(key) => {
            embedding = Arc::new(GeminiEmbedding::new(
                key.clone(),
                config.gemini_embedding_model.clone(),
            )?);
            let client: Arc<dyn TextGenerator> =
                Arc::new(GeminiClient::new(key.clone(), config.gemini_model.clone())?);
            llm = Some(client);
        }
        None => {
            warn!("GEMINI_API_KEY not set, using local hashing embeddings without summaries");
            embedding = Arc::new(HashingEmbedding::new(config.embedding_dimension));
        }
    }

    let sessions = SessionStore::new(MemoryServices {
        vector_store: Arc::new(InMemoryVectorStore::new()),
        embedding,
        llm,
        config,
    });

    let manager = sessions.get_or_create("demo-session", Some("demo-user")).await;

    manager
        .add_conversation_turn(
            "I'm planning a trip to Lisbon in May.",
            "Great choice! May has mild weather and fewer crowds.",
            None,
            None,
        )
        .await?;
    manager
        .add_message(
            "I'm allergic to shellfish, please remember that.",
            MemoryRole::User,
            0.9,
            None,
        )
        .await?;
    manager
        .add_message(
            "Noted: no shellfish recommendations.",
            MemoryRole::Assistant,
            0.7,
            None,
        )
        .await?;

    println!("\n=== CONVERSATION HISTORY ===");
    for message in manager.get_conversation_history(None, 4000).await {
        println!("  {}: {}", message.role, message.content);
    }

    println!("\n=== SEARCH: \"shellfish\" ===");
    for item in manager.search_all("shellfish", 5, true, true).await? {
        println!("  [{:.1}] {}: {}", item.importance, item.role, item.content);
    }

    let context = manager
        .get_relevant_context("food allergies", 3, 3)
        .await?;
    println!("\n=== RELEVANT CONTEXT ===");
    println!("  short-term: {} items", context.short_term.len());
    for item in &context.long_term {
        println!("  long-term: {}", item.content);
    }

    match manager.summarize_and_archive(10).await {
        Ok(Some(id)) => info!(summary_id = %id, "Conversation summarized"),
        Ok(None) => info!("Summarization skipped"),
        Err(e) => warn!("Summarization failed: {}", e),
    }

    let stats = manager.get_stats().await?;
    println!("\n=== MEMORY STATS ===");
    println!("{}", serde_json::to_string_pretty(&stats)?);

    // Auto-archived messages, excluding summaries
    let band = MetadataFilter::new().gte("importance", 0.6).lte("importance", 0.79);
    println!("\n=== ARCHIVED MESSAGES ===");
    for item in manager
        .long_term()
        .search_filtered("shellfish trip", 5, Some(band), 0.0)
        .await?
    {
        println!("  [{:.1}] {}", item.importance, item.content);
    }

    dump("long-term", manager.long_term()).await?;

    sessions.remove("demo-session", Some("demo-user")).await;
    Ok(())
}

/// Print the newest items of any memory tier
async fn dump(label: &str, store: &dyn MemoryStore) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n=== {} ({} items) ===", label.to_uppercase(), store.count().await?);
    for item in store.get_recent(5).await? {
        println!("  {} {}: {}", item.timestamp.format("%H:%M:%S"), item.role, item.content);
    }
    Ok(())
}
