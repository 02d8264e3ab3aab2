//! Agent memory
//!
//! Two tiers behind one manager: a bounded short-term buffer for the live
//! conversation and a vector-backed long-term store for what should outlive it.

pub mod item;
pub mod long_term;
pub mod manager;
pub mod session;
pub mod short_term;
pub mod store;

pub use item::{MemoryItem, MemoryRole, Metadata, DEFAULT_IMPORTANCE};
pub use long_term::LongTermMemory;
pub use manager::{MemoryManager, MemoryStats, RelevantContext};
pub use session::{MemoryServices, SessionStore};
pub use short_term::ShortTermMemory;
pub use store::MemoryStore;
