//! Object-store backends and the pointer-indirected document protocol.
//!
//! The backing service is an immutable-object blob store: every named
//! object, once written, is treated as permanently immutable and
//! independently cacheable. The only mutable thing in the system is a
//! small pointer object naming the currently-canonical data blob.
//!
//! Two backends ship behind the [`ObjectStore`] trait:
//! - `supabase`: Supabase Storage over HTTP (production)
//! - `memory`: in-process map (development, tests)

pub mod document;
pub mod memory;
pub mod supabase;

pub use document::{DocumentStore, Snapshot};

use crate::config::StoreConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure talking to the backend.
    #[error("object store request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("object store returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// The pointer moved between `load` and `commit`.
    #[error("document version changed (expected {expected:?}, found {found:?})")]
    Conflict {
        expected: Option<String>,
        found: Option<String>,
    },
}

/// A named object living in the backend, with its direct read URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub url: String,
}

/// Contract every blob backend implements.
///
/// `fetch` may be served from any cache layer (direct blob URLs are
/// unique per write, so staleness is impossible); `fetch_fresh` must
/// bypass caches and is reserved for pointer reads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name for logs and the health endpoint.
    fn name(&self) -> &str;

    /// Write `content` under `name`, overwriting any previous object
    /// with that name. Returns the stored object with its read URL.
    async fn put(
        &self,
        name: &str,
        content: &str,
        content_type: &str,
    ) -> Result<StoredObject, StoreError>;

    /// List objects whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError>;

    /// Cacheable read of a direct object URL. `None` when absent.
    async fn fetch(&self, url: &str) -> Result<Option<String>, StoreError>;

    /// Cache-bypassing read of a direct object URL. `None` when absent.
    async fn fetch_fresh(&self, url: &str) -> Result<Option<String>, StoreError>;

    /// Remove an object by name. Absent objects are a no-op.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Direct read URL for a named object.
    fn public_url(&self, name: &str) -> String;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> bool;
}

/// Build the object store selected by `[store] backend` in the config.
pub fn create_object_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.backend.as_str() {
        "supabase" => {
            let store = supabase::SupabaseStore::new(config)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(memory::MemoryStore::new())),
        other => anyhow::bail!("Unknown store backend '{other}' (expected 'supabase' or 'memory')"),
    }
}
