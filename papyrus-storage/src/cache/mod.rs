//! Paper answer cache.
//!
//! [`PaperAnswerCache`] is a cache-aside layer: the store is the only source
//! of truth and the cache never holds data of its own. What it adds is
//! [`SingleFlight`] deduplication of concurrent misses, so a slow generator is
//! called once per key per process no matter how many requests arrive.
//!
//! Deduplication is process-local. Two server instances missing the same key
//! at the same moment may both generate; the store's unique constraint on
//! `(school, paper_id)` makes the second insert fail, and that writer adopts
//! the stored row instead.
//!
//! # Example
//!
//! ```ignore
//! let cache = PaperAnswerCache::new(store, generator, CacheConfig::default());
//! let key = PaperKey::new(7, 101)?;
//! let answer = cache.get_or_create(key, Some(account_id)).await?;
//! ```

pub mod paper_answer;
pub mod single_flight;

pub use paper_answer::{CacheConfig, PaperAnswerCache, DEFAULT_GENERATION_TIMEOUT};
pub use single_flight::SingleFlight;
