//! Two-tier cache provider
//!
//! Combines a process-local in-memory store with a remote Redis-family
//! backend and keeps the two tiers coherent through keyspace-event
//! subscription. Callers pick, per operation, whether a value lives in the
//! local tier, the remote tier, or both with automatic remote-to-local
//! sync.
//!
//! Without a configured backend the provider runs local-only, so the same
//! calling code works in environments with no cache server at all.

pub mod config;
pub mod error;
pub mod keys;
pub mod local;
pub mod lock;
pub mod provider;
pub mod remote;
pub mod sync;
pub mod value;

pub use config::{Endpoint, ProviderOptions};
pub use error::CacheError;
pub use provider::{
  CacheLevel, CacheProvider, CacheStats, DeleteOptions, GetOptions, SetOptions,
};
pub use value::{Scalar, StoredValue};
