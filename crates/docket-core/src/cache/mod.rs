//! Auxiliary key-value caching.
//!
//! This module provides `TtlCache`, an expiring in-memory store for values
//! that do not belong in the query cache (search results, computed views).
//! Entries expire after 5 minutes unless stored with their own TTL.

pub mod ttl;

pub use ttl::{CacheStats, TtlCache, TtlEntry, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL, MIN_SWEEP_INTERVAL};
