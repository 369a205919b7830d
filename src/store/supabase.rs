//! Supabase Storage backend.
//!
//! Writes go through the authenticated object API with upsert enabled;
//! reads use the public CDN-fronted URL. The CDN caches aggressively
//! and does not guarantee freshness on overwrite of a fixed key, which
//! is exactly why the document layer never reads a rewritten object
//! through the cacheable path — pointer reads use `fetch_fresh`.

use super::{ObjectStore, StoreError, StoredObject};
use crate::config::StoreConfig;
use async_trait::async_trait;
use serde::Deserialize;

/// Supabase Storage client.
pub struct SupabaseStore {
    base_url: String,
    bucket: String,
    service_key: String,
    http: reqwest::Client,
}

/// One entry of the storage list API response.
#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
}

impl SupabaseStore {
    /// Build a client from the store configuration.
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let base_url = config.url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            anyhow::bail!("store.url is required for the supabase backend");
        }
        let service_key = config
            .service_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "store.service_key (or ROLLCALL_STORE_KEY) is required for the supabase backend"
                )
            })?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            bucket: config.bucket.clone(),
            service_key,
            http,
        })
    }

    /// Authenticated object URL (writes and deletes).
    fn object_url(&self, name: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, name)
    }

    /// List endpoint for the bucket.
    fn list_url(&self) -> String {
        format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket)
    }

    fn auth_headers(&self) -> Vec<(&str, String)> {
        vec![
            ("apikey", self.service_key.clone()),
            ("Authorization", format!("Bearer {}", self.service_key)),
        ]
    }

    async fn read(&self, url: &str, fresh: bool) -> Result<Option<String>, StoreError> {
        let mut request = self.http.get(url);
        if fresh {
            // Force edge revalidation and defeat any URL-keyed cache.
            request = request
                .header("Cache-Control", "no-store, max-age=0")
                .header("Pragma", "no-cache")
                .query(&[("fresh", uuid::Uuid::new_v4().simple().to_string())]);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            // Supabase answers 400 with an error body for missing keys.
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(resp.text().await?))
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn put(
        &self,
        name: &str,
        content: &str,
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        let mut request = self
            .http
            .post(self.object_url(name))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .header("Cache-Control", "no-cache")
            .body(content.to_owned());
        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Backend { status, body });
        }

        Ok(StoredObject {
            name: name.to_owned(),
            url: self.public_url(name),
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        // The list API scopes by folder; filter to the exact prefix on
        // the client side so callers get plain starts_with semantics.
        let folder = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let payload = serde_json::json!({
            "prefix": folder,
            "limit": 1000,
            "sortBy": { "column": "name", "order": "asc" },
        });

        let mut request = self.http.post(self.list_url()).json(&payload);
        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Backend { status, body });
        }

        let entries: Vec<ListEntry> = resp.json().await?;
        let objects = entries
            .into_iter()
            .map(|entry| {
                let name = if folder.is_empty() {
                    entry.name
                } else {
                    format!("{folder}/{}", entry.name)
                };
                StoredObject {
                    url: self.public_url(&name),
                    name,
                }
            })
            .filter(|obj| obj.name.starts_with(prefix))
            .collect();
        Ok(objects)
    }

    async fn fetch(&self, url: &str) -> Result<Option<String>, StoreError> {
        self.read(url, false).await
    }

    async fn fetch_fresh(&self, url: &str) -> Result<Option<String>, StoreError> {
        self.read(url, true).await
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut request = self.http.delete(self.object_url(name));
        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, name
        )
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/storage/v1/bucket/{}", self.base_url, self.bucket);
        let mut request = self.http.get(&url);
        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }
        matches!(request.send().await, Ok(resp) if resp.status().is_success())
    }
}
