//! Pointer-indirected document persistence.
//!
//! The backend serves immutable, independently-named blobs through a
//! caching edge with no update-in-place and no read-your-writes on
//! rewritten keys. Read-after-write consistency comes from indirection:
//! every commit writes the whole document to a freshly-named blob and
//! then repoints a single well-known pointer object at it. The pointer
//! is the only object ever rewritten, and it is only ever read through
//! the cache-bypassing path; data blobs are read through their unique
//! direct URLs, which are safe to cache forever.
//!
//! `commit` carries the blob name the caller observed at `load` and
//! refuses to repoint when the pointer has moved since — a concurrent
//! writer's update is reported as a conflict instead of silently
//! discarded. The check is read-then-write (the backend has no CAS), so
//! a narrow last-repoint-wins window remains.

use super::{ObjectStore, StoreError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A point-in-time view of a logical document.
///
/// `version` is the name of the blob the pointer named at read time;
/// `None` means the read fell back to the seed/empty document (pointer
/// absent or unreachable) and no committed version was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub document: String,
    pub version: Option<String>,
}

/// One logical document persisted through pointer indirection.
pub struct DocumentStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    doc: String,
    header: String,
    seed: Option<String>,
    keep_versions: usize,
}

impl DocumentStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prefix: &str,
        doc: &str,
        header: &str,
        seed: Option<String>,
        keep_versions: usize,
    ) -> Self {
        Self {
            store,
            prefix: prefix.trim_matches('/').to_owned(),
            doc: doc.to_owned(),
            header: header.to_owned(),
            seed,
            keep_versions,
        }
    }

    /// Name of the pointer object for this document.
    pub fn pointer_name(&self) -> String {
        format!("{}/{}.ptr", self.prefix, self.doc)
    }

    /// Shared name prefix of every data blob this document ever writes.
    fn blob_prefix(&self) -> String {
        format!("{}/{}-", self.prefix, self.doc)
    }

    /// Fresh, globally-unique blob name. Reusing a name would let the
    /// edge serve stale cached content to a reader who resolved the old
    /// pointer, so uniqueness per call is load-bearing.
    fn next_blob_name(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!(
            "{}{}-{}.csv",
            self.blob_prefix(),
            millis,
            uuid::Uuid::new_v4().simple()
        )
    }

    /// The document served when nothing has been committed yet.
    fn fallback_document(&self) -> String {
        self.seed
            .clone()
            .unwrap_or_else(|| format!("{}\n", self.header))
    }

    /// Cache-bypassing read of the pointer. `None` when absent.
    async fn read_pointer(&self) -> Result<Option<String>, StoreError> {
        let url = self.store.public_url(&self.pointer_name());
        let content = self.store.fetch_fresh(&url).await?;
        Ok(content
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty()))
    }

    /// Read the current document. Never fails: read-side problems
    /// degrade to the seed/empty document with `version: None`.
    pub async fn load(&self) -> Snapshot {
        let pointer = match self.read_pointer().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(doc = %self.doc, "Pointer read failed, serving fallback: {e}");
                return self.fallback_snapshot();
            }
        };

        let Some(blob_name) = pointer else {
            tracing::debug!(doc = %self.doc, "No pointer yet, serving fallback");
            return self.fallback_snapshot();
        };

        match self.store.fetch(&self.store.public_url(&blob_name)).await {
            Ok(Some(document)) => Snapshot {
                document,
                version: Some(blob_name),
            },
            Ok(None) => {
                tracing::warn!(
                    doc = %self.doc,
                    blob = %blob_name,
                    "Pointer names a missing blob, serving fallback"
                );
                self.fallback_snapshot()
            }
            Err(e) => {
                tracing::warn!(doc = %self.doc, "Blob fetch failed, serving fallback: {e}");
                self.fallback_snapshot()
            }
        }
    }

    fn fallback_snapshot(&self) -> Snapshot {
        Snapshot {
            document: self.fallback_document(),
            version: None,
        }
    }

    /// Durably replace the document.
    ///
    /// `expected_version` is the `version` of the snapshot the caller
    /// mutated. The commit is rejected with [`StoreError::Conflict`]
    /// when the pointer no longer names that version. On success the
    /// new blob name is returned and superseded versions beyond the
    /// retention window are pruned best-effort.
    pub async fn commit(
        &self,
        document: &str,
        expected_version: Option<&str>,
    ) -> Result<String, StoreError> {
        let found = self.read_pointer().await?;
        if found.as_deref() != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version.map(str::to_owned),
                found,
            });
        }

        let blob_name = self.next_blob_name();
        self.store.put(&blob_name, document, "text/csv").await?;
        self.store
            .put(&self.pointer_name(), &blob_name, "text/plain")
            .await?;
        tracing::debug!(doc = %self.doc, blob = %blob_name, "Document committed");

        if self.keep_versions > 0 {
            self.prune_versions(&blob_name).await;
        }
        Ok(blob_name)
    }

    /// Explicit idempotent bootstrap: when no pointer exists yet, write
    /// the seed document (or the bare header) as the first version.
    /// Returns `true` when this call performed the bootstrap.
    pub async fn ensure_initialized(&self) -> Result<bool, StoreError> {
        if self.read_pointer().await?.is_some() {
            return Ok(false);
        }

        let document = self.fallback_document();
        let blob_name = self.next_blob_name();
        self.store.put(&blob_name, &document, "text/csv").await?;
        self.store
            .put(&self.pointer_name(), &blob_name, "text/plain")
            .await?;
        tracing::info!(doc = %self.doc, blob = %blob_name, "Document bootstrapped");
        Ok(true)
    }

    /// Delete superseded blobs beyond the newest `keep_versions`.
    /// Failures are logged and never affect the commit that triggered
    /// the prune.
    async fn prune_versions(&self, current: &str) {
        let names = match self.store.list(&self.blob_prefix()).await {
            Ok(objects) => objects.into_iter().map(|o| o.name).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(doc = %self.doc, "Version listing failed, skipping prune: {e}");
                return;
            }
        };

        // Blob names embed a fixed-width millisecond timestamp, so
        // lexical order is chronological.
        let mut superseded: Vec<&String> = names.iter().filter(|n| n.as_str() != current).collect();
        superseded.sort_unstable_by(|a, b| b.cmp(a));

        for name in superseded.iter().skip(self.keep_versions) {
            if let Err(e) = self.store.delete(name).await {
                tracing::warn!(doc = %self.doc, blob = %name, "Version prune failed: {e}");
            }
        }
    }
}
