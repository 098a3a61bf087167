//! Core library for docket: the data layer of a legal case-management client.
//!
//! - `api`: HTTP gateway (`ApiClient`) with bearer auth, error normalization
//!   and one accessor per endpoint
//! - `models`: typed resources exchanged with the API
//! - `query`: query cache with coalescing, staleness, retries, GC and the
//!   optimistic mutation protocol
//! - `keys` / `data`: the application's query keys and typed bindings
//! - `cache`: auxiliary TTL cache
//! - `store`: persisted auth, UI and filter stores
//! - `config` / `context`: configuration and the `AppContext` container

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod data;
pub mod keys;
pub mod models;
pub mod query;
pub mod store;

pub use api::{ApiClient, ApiError, ErrorKind};
pub use cache::TtlCache;
pub use config::Config;
pub use context::AppContext;
pub use query::{Mutation, MutationOptions, QueryClient, QueryConfig, QueryHandle, QueryKey, QueryOptions};
