//! Caching subsystem.
//!
//! [`ResponseCache`] stores finished provider answers so repeated or
//! near-duplicate requests skip the queue, the provider call and the usage
//! ledger entirely. The orchestrator keeps one cache per response shape:
//!
//! - encouragements are looked up with [`ResponseCache::get`] on an exact
//!   context+mood key;
//! - shrink results are looked up with [`ResponseCache::get_similar`] so
//!   "Clean my room!" reuses the answer for "clean my room".
//!
//! Keys are normalized by [`normalize_key`] before every comparison.

pub mod response;
mod similarity;

pub use response::{CacheConfig, CacheStats, ResponseCache};
pub use similarity::{normalize_key, similarity};
