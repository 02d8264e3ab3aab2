//! Environment-driven configuration
//!
//! Every value has a default so the subsystem runs without any environment set.
//! Binaries are expected to call `dotenv::dotenv()` before `MemoryConfig::from_env()`.

use crate::error::MemoryError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SHORT_TERM_SIZE: usize = 10;
pub const DEFAULT_COLLECTION: &str = "long_term_memory";
pub const DEFAULT_ARCHIVE_THRESHOLD: f64 = 0.6;

/// Memory subsystem settings
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Capacity of each session's short-term buffer
    pub short_term_memory_size: usize,
    /// Vector store collection backing long-term memory
    pub long_term_memory_collection: String,
    /// Copy important messages to long-term memory as they arrive
    pub auto_archive: bool,
    /// Importance at or above which auto-archival happens
    pub archive_threshold: f64,
    /// Idle time after which a session's manager is dropped
    pub session_ttl: Duration,
    /// Maximum number of live session managers
    pub max_sessions: usize,
    /// Dimension of the local hashing embedder
    pub embedding_dimension: usize,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_embedding_model: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_memory_size: DEFAULT_SHORT_TERM_SIZE,
            long_term_memory_collection: DEFAULT_COLLECTION.to_string(),
            auto_archive: true,
            archive_threshold: DEFAULT_ARCHIVE_THRESHOLD,
            session_ttl: Duration::from_secs(3600),
            max_sessions: 1024,
            embedding_dimension: 256,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_embedding_model: "text-embedding-004".to_string(),
        }
    }
}

impl MemoryConfig {
    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            short_term_memory_size: parse_var(
                "SHORT_TERM_MEMORY_SIZE",
                defaults.short_term_memory_size,
            )?,
            long_term_memory_collection: env::var("LONG_TERM_MEMORY_COLLECTION")
                .unwrap_or(defaults.long_term_memory_collection),
            auto_archive: parse_bool("MEMORY_AUTO_ARCHIVE", defaults.auto_archive)?,
            archive_threshold: parse_var("MEMORY_ARCHIVE_THRESHOLD", defaults.archive_threshold)?,
            session_ttl: Duration::from_secs(parse_var(
                "MEMORY_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
            max_sessions: parse_var("MEMORY_MAX_SESSIONS", defaults.max_sessions)?,
            embedding_dimension: parse_var("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_embedding_model: env::var("GEMINI_EMBEDDING_MODEL")
                .unwrap_or(defaults.gemini_embedding_model),
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| {
            MemoryError::Config(format!("invalid value for {}: {:?} ({})", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(MemoryError::Config(format!(
                "invalid boolean for {}: {:?}",
                key, other
            ))),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.short_term_memory_size, 10);
        assert_eq!(config.long_term_memory_collection, "long_term_memory");
        assert!(config.auto_archive);
        assert_eq!(config.archive_threshold, 0.6);
        assert!(config.gemini_api_key.is_none());
    }

    // Environment is process-global, so all env-driven cases live in one test.
    #[test]
    fn test_from_env() {
        env::set_var("SHORT_TERM_MEMORY_SIZE", "25");
        env::set_var("MEMORY_AUTO_ARCHIVE", "off");
        env::set_var("MEMORY_ARCHIVE_THRESHOLD", "0.75");
        let config = MemoryConfig::from_env().unwrap();
        assert_eq!(config.short_term_memory_size, 25);
        assert!(!config.auto_archive);
        assert_eq!(config.archive_threshold, 0.75);

        env::set_var("SHORT_TERM_MEMORY_SIZE", "lots");
        let err = MemoryConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SHORT_TERM_MEMORY_SIZE"));

        env::set_var("SHORT_TERM_MEMORY_SIZE", "10");
        env::set_var("MEMORY_AUTO_ARCHIVE", "maybe");
        assert!(MemoryConfig::from_env().is_err());

        env::remove_var("SHORT_TERM_MEMORY_SIZE");
        env::remove_var("MEMORY_AUTO_ARCHIVE");
        env::remove_var("MEMORY_ARCHIVE_THRESHOLD");
    }
}
