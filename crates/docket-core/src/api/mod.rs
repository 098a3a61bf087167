//! REST API gateway and resource accessors.
//!
//! This module provides the `ApiClient` for communicating with the
//! case-management API: bearer-token injection, error normalization into
//! `ApiError`, and one accessor per endpoint.

pub mod accessors;
pub mod client;
pub mod error;

pub use client::{ApiClient, DEFAULT_API_BASE_URL};
pub use error::{ApiError, ErrorKind};
