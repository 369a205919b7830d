//! Configuration for the roster service.
//!
//! Loaded exactly once at startup from a TOML file and passed by
//! reference into the store and gateway constructors. Secrets may be
//! supplied through the environment, which takes priority over the
//! file; nothing reads the environment after startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "rollcall.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Sliding-window limit for login attempts per client per minute.
    /// 0 disables the limiter.
    pub login_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            login_per_minute: 30,
        }
    }
}

/// Object-store backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selector: "supabase" or "memory".
    pub backend: String,
    /// Base URL of the Supabase project (e.g. https://xxxx.supabase.co).
    pub url: String,
    /// Storage bucket holding all documents.
    pub bucket: String,
    /// Service role key for authenticated writes. Overridden by
    /// `ROLLCALL_STORE_KEY` when set.
    pub service_key: Option<String>,
    /// Name prefix for every object this service writes.
    pub prefix: String,
    /// Per-request timeout for backend calls, in seconds.
    pub request_timeout_secs: u64,
    /// How many superseded document versions to retain per logical
    /// document. 0 disables pruning.
    pub keep_versions: usize,
    /// Optional seed document written on first boot when the pointer
    /// does not exist yet.
    pub seed_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            url: String::new(),
            bucket: "rollcall".into(),
            service_key: None,
            prefix: "rollcall".into(),
            request_timeout_secs: 10,
            keep_versions: 8,
            seed_path: None,
        }
    }
}

/// Session and credential settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Minimum accepted password length at registration.
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 24 * 3600,
            min_password_len: 8,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `rollcall.toml` in the
    /// working directory, or fall back to defaults when neither exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    tracing::info!("No {CONFIG_FILE} found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(
            std::env::var("ROLLCALL_STORE_URL").ok(),
            std::env::var("ROLLCALL_STORE_KEY").ok(),
        );
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Environment values win over the file; blank values are ignored.
    fn apply_env_overrides(&mut self, url: Option<String>, service_key: Option<String>) {
        if let Some(url) = url.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) {
            self.store.url = url;
        }
        if let Some(key) = service_key
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
        {
            self.store.service_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.store.keep_versions, 8);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert_eq!(config.auth.min_password_len, 8);
    }

    #[test]
    fn parses_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [gateway]
            port = 9000

            [store]
            backend = "supabase"
            url = "https://demo.supabase.co"
            bucket = "people"
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.store.backend, "supabase");
        assert_eq!(config.store.bucket, "people");
        assert_eq!(config.store.prefix, "rollcall");
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = Config::default();
        config.store.url = "https://file.supabase.co".into();
        config.store.service_key = Some("file-key".into());

        config.apply_env_overrides(
            Some("https://env.supabase.co".into()),
            Some("env-key".into()),
        );
        assert_eq!(config.store.url, "https://env.supabase.co");
        assert_eq!(config.store.service_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.store.service_key = Some("file-key".into());

        config.apply_env_overrides(Some("  ".into()), Some(String::new()));
        assert_eq!(config.store.url, "");
        assert_eq!(config.store.service_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let result = Config::from_file(Path::new("/nonexistent/rollcall.toml"));
        assert!(result.is_err());
    }
}
