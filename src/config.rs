// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for the session server.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file
//! (`~/.authyntic/config.json` or `--config`), environment variables, CLI flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::security::cookie::DEFAULT_COOKIE_NAME;
use crate::security::credentials::{UserProfile, UserRegistry, DEFAULT_PEPPER};
use crate::security::issuer::DEFAULT_SESSION_DURATION_MS;
use crate::security::rate_limit::RateLimitConfig;
use crate::utils::mask_sensitive;

/// Secret of the demo deployment. Only suitable for local development.
pub const DEFAULT_SESSION_SECRET: &str = "authyntic-session-secret";

pub const ENV_PEPPER: &str = "AUTHYNTIC_PEPPER";
pub const ENV_SESSION_SECRET: &str = "AUTHYNTIC_SESSION_SECRET";
pub const ENV_COOKIE_SECURE: &str = "AUTHYNTIC_COOKIE_SECURE";
pub const ENV_ALLOWED_ORIGINS: &str = "AUTHYNTIC_ALLOWED_ORIGINS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the login path.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_pepper")]
    pub pepper: String,
    #[serde(default = "default_session_secret")]
    pub session_secret: String,
    #[serde(default = "default_session_duration_ms")]
    pub session_duration_ms: u64,
    /// Must be true whenever the site is served over TLS.
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Minimum latency of a credential rejection, measured from receipt.
    #[serde(default = "default_failure_delay_ms")]
    pub failure_delay_ms: u64,
    /// Origins reflected by CORS on the session endpoint. Empty means same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Replaces the built-in operator registry when non-empty.
    #[serde(default)]
    pub users: Vec<UserProfile>,
}

fn default_pepper() -> String {
    DEFAULT_PEPPER.to_string()
}

fn default_session_secret() -> String {
    DEFAULT_SESSION_SECRET.to_string()
}

fn default_session_duration_ms() -> u64 {
    DEFAULT_SESSION_DURATION_MS
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_failure_delay_ms() -> u64 {
    500
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            pepper: default_pepper(),
            session_secret: default_session_secret(),
            session_duration_ms: default_session_duration_ms(),
            cookie_secure: false,
            cookie_name: default_cookie_name(),
            rate_limit: RateLimitConfig::default(),
            failure_delay_ms: default_failure_delay_ms(),
            allowed_origins: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("pepper", &mask_sensitive(&self.pepper, 2))
            .field("session_secret", &mask_sensitive(&self.session_secret, 2))
            .field("session_duration_ms", &self.session_duration_ms)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_name", &self.cookie_name)
            .field("rate_limit", &self.rate_limit)
            .field("failure_delay_ms", &self.failure_delay_ms)
            .field("allowed_origins", &self.allowed_origins)
            .field("users", &self.users.len())
            .finish()
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pepper.is_empty() {
            return Err(ConfigError::Invalid("pepper must not be empty".into()));
        }
        if self.session_secret.is_empty() {
            return Err(ConfigError::Invalid("session_secret must not be empty".into()));
        }
        if self.session_duration_ms == 0 {
            return Err(ConfigError::Invalid("session_duration_ms must be positive".into()));
        }
        if self.rate_limit.max_attempts < 1 {
            return Err(ConfigError::Invalid("rate_limit.max_attempts must be >= 1".into()));
        }
        if self.rate_limit.window_secs < 1 {
            return Err(ConfigError::Invalid("rate_limit.window_secs must be >= 1".into()));
        }
        if self.cookie_name.is_empty()
            || !self
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Invalid(format!(
                "cookie_name {:?} is not a valid cookie token",
                self.cookie_name
            )));
        }
        Ok(())
    }

    pub fn uses_demo_secrets(&self) -> bool {
        self.pepper == DEFAULT_PEPPER || self.session_secret == DEFAULT_SESSION_SECRET
    }

    /// Approved users: the configured list, or the built-in operators.
    pub fn user_registry(&self) -> UserRegistry {
        if self.users.is_empty() {
            UserRegistry::builtin()
        } else {
            UserRegistry::from_profiles(self.users.iter().cloned())
        }
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(pepper) = lookup(ENV_PEPPER) {
            self.pepper = pepper;
        }
        if let Some(secret) = lookup(ENV_SESSION_SECRET) {
            self.session_secret = secret;
        }
        if let Some(flag) = lookup(ENV_COOKIE_SECURE) {
            self.cookie_secure = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(origins) = lookup(ENV_ALLOWED_ORIGINS) {
            self.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
}

/// Settings for the HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Defaults to 127.0.0.1 (localhost only).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Directory of static site files served for non-API paths.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            static_dir: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Contents of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// `~/.authyntic/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".authyntic").join("config.json"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path`, else from the default path when it exists, else defaults.
    /// Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.auth.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.auth.validate().is_ok());
        assert_eq!(config.auth.session_duration_ms, 1_800_000);
        assert_eq!(config.auth.failure_delay_ms, 500);
        assert_eq!(config.auth.rate_limit, RateLimitConfig::new(6, 900));
        assert_eq!(config.server.port, 8000);
        assert!(config.auth.uses_demo_secrets());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut auth = AuthConfig::default();
        auth.rate_limit.max_attempts = 0;
        assert!(auth.validate().is_err());

        let mut auth = AuthConfig::default();
        auth.rate_limit.window_secs = 0;
        assert!(auth.validate().is_err());

        let mut auth = AuthConfig::default();
        auth.cookie_name = "bad name;".to_string();
        assert!(auth.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server":{{"port":9000}},"auth":{{"cookie_secure":true,"rate_limit":{{"max_attempts":3,"window_secs":60}}}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert!(config.auth.cookie_secure);
        assert_eq!(config.auth.rate_limit.max_attempts, 3);
        assert_eq!(config.auth.pepper, DEFAULT_PEPPER);
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_PEPPER, "prod-pepper"),
            (ENV_SESSION_SECRET, "prod-secret"),
            (ENV_COOKIE_SECURE, "true"),
            (ENV_ALLOWED_ORIGINS, "https://a.example, https://b.example,"),
        ]);
        let mut auth = AuthConfig::default();
        auth.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(auth.pepper, "prod-pepper");
        assert_eq!(auth.session_secret, "prod-secret");
        assert!(auth.cookie_secure);
        assert_eq!(auth.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert!(!auth.uses_demo_secrets());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let mut auth = AuthConfig::default();
        auth.session_secret = "super-secret-value".to_string();
        let printed = format!("{:?}", auth);
        assert!(!printed.contains("super-secret-value"));
    }

    #[test]
    fn test_configured_users_replace_builtin() {
        let mut auth = AuthConfig::default();
        assert!(auth.user_registry().get("justin").is_some());

        auth.users = vec![UserProfile::with_password("Ops", "Ops", "pw", "p", &["Operator"])];
        let registry = auth.user_registry();
        assert!(registry.get("justin").is_none());
        assert_eq!(registry.get("ops").unwrap().roles, vec!["operator"]);
    }
}
