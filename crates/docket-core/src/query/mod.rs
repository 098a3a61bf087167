//! Query cache and optimistic mutation protocol.
//!
//! - `QueryClient`: keyed, type-erased cache of server snapshots with
//!   staleness tracking, coalescing, retries and garbage collection
//! - `QueryHandle`: a typed subscription to one key
//! - `Mutation` / `MutationOptions`: writes with optimistic patches,
//!   rollback and revalidation

pub mod client;
pub mod config;
pub mod handle;
pub mod key;
pub mod mutation;
pub mod retry;
pub mod state;

pub use client::QueryClient;
pub use config::{QueryConfig, QueryOptions, DEFAULT_GC_TIME, DEFAULT_STALE_TIME};
pub use handle::QueryHandle;
pub use key::QueryKey;
pub use mutation::{Mutation, MutationOptions, MutationRecord, MutationState, MutationStatus};
pub use retry::RetryPolicy;
pub use state::{QueryState, QueryStatus};
