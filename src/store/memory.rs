//! In-process object store for development and tests.
//!
//! Faithful to the backend contract the document layer relies on:
//! objects are independently named, `put` on an existing name
//! overwrites, and URLs are stable `mem://` forms of the name. There
//! is no cache layer, so `fetch` and `fetch_fresh` behave identically.

use super::{ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

const URL_SCHEME: &str = "mem://";

#[derive(Debug, Clone)]
struct MemObject {
    content: String,
    content_type: String,
}

/// Map-backed object store.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, MemObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for a stored object (test helper).
    pub fn content_type_of(&self, name: &str) -> Option<String> {
        self.objects
            .lock()
            .get(name)
            .map(|obj| obj.content_type.clone())
    }

    /// Number of stored objects (test helper).
    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(
        &self,
        name: &str,
        content: &str,
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        self.objects.lock().insert(
            name.to_owned(),
            MemObject {
                content: content.to_owned(),
                content_type: content_type.to_owned(),
            },
        );
        Ok(StoredObject {
            name: name.to_owned(),
            url: self.public_url(name),
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        let objects = self.objects.lock();
        Ok(objects
            .keys()
            .filter(|name| name.starts_with(prefix))
            .map(|name| StoredObject {
                name: name.clone(),
                url: format!("{URL_SCHEME}{name}"),
            })
            .collect())
    }

    async fn fetch(&self, url: &str) -> Result<Option<String>, StoreError> {
        let name = url.strip_prefix(URL_SCHEME).unwrap_or(url);
        Ok(self.objects.lock().get(name).map(|obj| obj.content.clone()))
    }

    async fn fetch_fresh(&self, url: &str) -> Result<Option<String>, StoreError> {
        self.fetch(url).await
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.objects.lock().remove(name);
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!("{URL_SCHEME}{name}")
    }

    async fn health_check(&self) -> bool {
        true
    }
}
