//! Token-based session layer.
//!
//! Sessions are a second logical document persisted through the same
//! pointer-indirected store as the roster, in a disjoint namespace.
//! Tokens are opaque 32-byte random identifiers handed to the client;
//! only their SHA-256 hash is stored, mapped to `{email, role,
//! expiresAt}`. A token is valid iff its hash is present and unexpired.
//! Expired entries are purged lazily on lookup — there is no background
//! sweep.

use crate::roster::Role;
use crate::store::{DocumentStore, StoreError};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Schema tag of the session document.
pub const SESSIONS_HEADER: &str = "TokenHash,Email,Role,ExpiresAt";

/// Token byte length before hex encoding (32 bytes = 256 bits).
const TOKEN_BYTES: usize = 32;

/// The identity a valid token proves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

/// One row of the session document.
#[derive(Debug, Clone)]
struct SessionRow {
    token_hash: String,
    email: String,
    role: String,
    expires_at: u64,
}

impl SessionRow {
    fn to_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.token_hash, self.email, self.role, self.expires_at
        )
    }
}

/// Session issuance, validation and revocation.
pub struct SessionStore {
    docs: DocumentStore,
    ttl_secs: u64,
}

impl SessionStore {
    pub fn new(docs: DocumentStore, ttl_secs: u64) -> Self {
        Self { docs, ttl_secs }
    }

    /// Mint a token for an authenticated identity and persist its
    /// mapping. The plaintext token is returned exactly once.
    pub async fn issue(&self, email: &str, role: Role) -> Result<String, StoreError> {
        let token = generate_token();
        let now = epoch_secs();

        let snapshot = self.docs.load().await;
        let mut rows = parse_rows(&snapshot.document);
        rows.retain(|row| row.expires_at > now);
        rows.push(SessionRow {
            token_hash: hash_token(&token),
            email: email.trim().to_ascii_lowercase(),
            role: role.as_str().to_owned(),
            expires_at: now + self.ttl_secs,
        });

        self.docs
            .commit(&serialize_rows(&rows), snapshot.version.as_deref())
            .await?;
        Ok(token)
    }

    /// Resolve a token to its identity. Absent or expired tokens are
    /// invalid; discovering an expired entry evicts it (best effort).
    pub async fn validate(&self, token: &str) -> Option<Identity> {
        let token_hash = hash_token(token);
        let now = epoch_secs();

        let snapshot = self.docs.load().await;
        let rows = parse_rows(&snapshot.document);
        let row = rows.iter().find(|row| row.token_hash == token_hash)?;

        if row.expires_at <= now {
            let live: Vec<SessionRow> = rows
                .iter()
                .filter(|row| row.expires_at > now)
                .cloned()
                .collect();
            if let Err(e) = self
                .docs
                .commit(&serialize_rows(&live), snapshot.version.as_deref())
                .await
            {
                tracing::debug!("Expired-session eviction skipped: {e}");
            }
            return None;
        }

        Some(Identity {
            email: row.email.clone(),
            role: Role::parse(&row.role),
        })
    }

    /// Remove a token's mapping. Idempotent: revoking an absent token
    /// is a successful no-op.
    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let token_hash = hash_token(token);

        let snapshot = self.docs.load().await;
        let mut rows = parse_rows(&snapshot.document);
        let before = rows.len();
        rows.retain(|row| row.token_hash != token_hash);
        if rows.len() == before {
            return Ok(());
        }

        self.docs
            .commit(&serialize_rows(&rows), snapshot.version.as_deref())
            .await?;
        Ok(())
    }
}

/// Generate an unguessable session token (hex-encoded, 256 bits).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a token for storage (single SHA-256 pass — tokens are already
/// high-entropy).
fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Decode session rows, skipping the header and anything malformed.
fn parse_rows(document: &str) -> Vec<SessionRow> {
    document
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split(',');
            let token_hash = fields.next()?.trim().to_owned();
            let email = fields.next()?.trim().to_owned();
            let role = fields.next()?.trim().to_owned();
            let expires_at = fields.next()?.trim().parse().ok()?;
            if token_hash.is_empty() {
                return None;
            }
            Some(SessionRow {
                token_hash,
                email,
                role,
                expires_at,
            })
        })
        .collect()
}

fn serialize_rows(rows: &[SessionRow]) -> String {
    let mut out = String::from(SESSIONS_HEADER);
    for row in rows {
        out.push('\n');
        out.push_str(&row.to_line());
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn store_with_ttl(ttl_secs: u64) -> (Arc<MemoryStore>, SessionStore) {
        let backend = Arc::new(MemoryStore::new());
        let docs = DocumentStore::new(
            backend.clone(),
            "rollcall",
            "sessions",
            SESSIONS_HEADER,
            None,
            0,
        );
        (backend, SessionStore::new(docs, ttl_secs))
    }

    #[tokio::test]
    async fn issue_then_validate_returns_identity() {
        let (_backend, sessions) = store_with_ttl(3600);
        let token = sessions.issue("Ada@Example.com", Role::Admin).await.unwrap();

        let identity = sessions.validate(&token).await.unwrap();
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.role, Role::Admin);
    }

    #[tokio::test]
    async fn validate_unknown_token_is_invalid() {
        let (_backend, sessions) = store_with_ttl(3600);
        assert!(sessions.validate("not-a-token").await.is_none());
    }

    #[tokio::test]
    async fn validate_after_ttl_elapsed_is_invalid() {
        let (_backend, sessions) = store_with_ttl(0);
        let token = sessions.issue("ada@example.com", Role::Author).await.unwrap();
        assert!(sessions.validate(&token).await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_lookup() {
        let (backend, sessions) = store_with_ttl(0);
        let token = sessions.issue("ada@example.com", Role::Author).await.unwrap();
        assert!(sessions.validate(&token).await.is_none());

        let docs = DocumentStore::new(backend, "rollcall", "sessions", SESSIONS_HEADER, None, 0);
        let document = docs.load().await.document;
        assert_eq!(document, format!("{SESSIONS_HEADER}\n"));
    }

    #[tokio::test]
    async fn revoke_then_validate_is_invalid() {
        let (_backend, sessions) = store_with_ttl(3600);
        let token = sessions.issue("ada@example.com", Role::Admin).await.unwrap();

        assert!(sessions.validate(&token).await.is_some());
        sessions.revoke(&token).await.unwrap();
        assert!(sessions.validate(&token).await.is_none());
    }

    #[tokio::test]
    async fn revoke_absent_token_is_a_noop() {
        let (_backend, sessions) = store_with_ttl(3600);
        assert!(sessions.revoke("never-issued").await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_sessions_coexist() {
        let (_backend, sessions) = store_with_ttl(3600);
        let t1 = sessions.issue("ada@example.com", Role::Admin).await.unwrap();
        let t2 = sessions.issue("grace@example.com", Role::Author).await.unwrap();

        assert_eq!(sessions.validate(&t1).await.unwrap().email, "ada@example.com");
        assert_eq!(sessions.validate(&t2).await.unwrap().email, "grace@example.com");

        sessions.revoke(&t1).await.unwrap();
        assert!(sessions.validate(&t1).await.is_none());
        assert!(sessions.validate(&t2).await.is_some());
    }

    #[tokio::test]
    async fn tokens_are_long_unique_and_stored_hashed() {
        let (backend, sessions) = store_with_ttl(3600);
        let t1 = sessions.issue("ada@example.com", Role::Admin).await.unwrap();
        let t2 = sessions.issue("ada@example.com", Role::Admin).await.unwrap();

        assert_eq!(t1.len(), TOKEN_BYTES * 2);
        assert_ne!(t1, t2);

        let docs = DocumentStore::new(backend, "rollcall", "sessions", SESSIONS_HEADER, None, 0);
        let document = docs.load().await.document;
        assert!(!document.contains(&t1));
        assert!(document.contains(&hash_token(&t1)));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let document = format!(
            "{SESSIONS_HEADER}\nabc,ada@example.com,Admin,not-a-number\n,x@example.com,Author,99\nok,grace@example.com,Author,99\n"
        );
        let rows = parse_rows(&document);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token_hash, "ok");
    }
}
