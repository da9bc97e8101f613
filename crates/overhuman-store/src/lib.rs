//! # overhuman-store
//!
//! The durable substrate: one embedded SQLite database (WAL, FTS5) shared
//! by three component stores.
//!
//! - **[`store`]** -- the shared [`Store`] handle and schema
//! - **[`long_term`]** -- [`LongTermMemory`], summaries with full-text search
//! - **[`patterns`]** -- [`PatternTracker`], fingerprinted running statistics
//! - **[`skb`]** -- [`SharedKnowledgeBase`], cross-agent knowledge items
//!
//! Construction order is store first, then the three components attach to
//! clones of the handle:
//!
//! ```rust,ignore
//! let store = Store::open(&data_dir.db_path())?;
//! let memory = LongTermMemory::new(store.clone());
//! let patterns = PatternTracker::new(store.clone());
//! let skb = SharedKnowledgeBase::new(store.clone());
//! ```

pub mod long_term;
pub mod patterns;
pub mod skb;
pub mod store;

pub use long_term::LongTermMemory;
pub use patterns::PatternTracker;
pub use skb::SharedKnowledgeBase;
pub use store::Store;
