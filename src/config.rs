//! Application configuration via environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::session::SessionOptions;

/// Which storage backend to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Local,
    S3,
    DynamoDb,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "local" => Ok(StorageKind::Local),
            "s3" => Ok(StorageKind::S3),
            "dynamodb" => Ok(StorageKind::DynamoDb),
            other => Err(ConfigError::Invalid {
                key: "STORAGE_BACKEND".into(),
                value: other.into(),
            }),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage_backend: StorageKind,
    pub storage_dir: String,
    pub storage_timeout_secs: u64,
    pub s3_bucket: String,
    pub s3_prefix: String,
    pub dynamodb_table: String,
    pub dynamodb_endpoint: String,
    pub session_ttl_secs: u64,
    pub session_location: String,
    pub session_suffix: String,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    pub allowed_methods: Vec<String>,
    pub redirect_to: Option<String>,
    pub redirect_hosts: Vec<String>,
    pub authorization: Option<String>,
    pub pages_location: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `S3_BUCKET` is required when `STORAGE_BACKEND=s3`. Everything else
    /// has a default suitable for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend: StorageKind = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "memory".into())
            .parse()?;

        let s3_bucket = if storage_backend == StorageKind::S3 {
            required_env("S3_BUCKET")?
        } else {
            env::var("S3_BUCKET").unwrap_or_default()
        };

        Ok(Self {
            port: parsed_env("PORT", 3001)?,
            storage_backend,
            storage_dir: env::var("STORAGE_DIR").unwrap_or_else(|_| "storage".into()),
            storage_timeout_secs: parsed_env("STORAGE_TIMEOUT_SECS", 10)?,
            s3_bucket,
            s3_prefix: env::var("S3_PREFIX").unwrap_or_default(),
            dynamodb_table: env::var("DYNAMODB_TABLE").unwrap_or_else(|_| "sitekit".into()),
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT").unwrap_or_default(),
            session_ttl_secs: session_ttl(parsed_env("SESSION_TTL_SECS", 20 * 60)?)?,
            session_location: env::var("SESSION_LOCATION").unwrap_or_else(|_| "sessions".into()),
            session_suffix: env::var("SESSION_SUFFIX").unwrap_or_default(),
            cookie_path: env::var("COOKIE_PATH").unwrap_or_else(|_| "/".into()),
            cookie_domain: optional_env("COOKIE_DOMAIN"),
            allowed_methods: split_list(
                &env::var("HTTP_METHODS_ALLOWED")
                    .unwrap_or_else(|_| "GET,HEAD,POST,PUT,DELETE,OPTIONS".into()),
            )
            .into_iter()
            .map(|m| m.to_ascii_uppercase())
            .collect(),
            redirect_to: optional_env("REDIRECT_TO"),
            redirect_hosts: split_list(&env::var("REDIRECT_HOSTS").unwrap_or_default()),
            authorization: optional_env("AUTHORIZATION"),
            pages_location: env::var("PAGES_LOCATION").unwrap_or_else(|_| "pages".into()),
        })
    }

    /// Session manager options derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            ttl: Duration::from_secs(self.session_ttl_secs),
            location: self.session_location.clone(),
            suffix: self.session_suffix.clone(),
            cookie_path: self.cookie_path.clone(),
            cookie_domain: self.cookie_domain.clone(),
            ..SessionOptions::default()
        }
    }

    /// Comma-separated allow-list, as sent in the `Allow` header.
    pub fn allow_header(&self) -> String {
        self.allowed_methods.join(", ")
    }
}

/// Configuration for testing: all fields settable directly.
impl Config {
    pub fn test_default() -> Self {
        Self {
            port: 3001,
            storage_backend: StorageKind::Memory,
            storage_dir: "storage".into(),
            storage_timeout_secs: 10,
            s3_bucket: String::new(),
            s3_prefix: String::new(),
            dynamodb_table: "sitekit".into(),
            dynamodb_endpoint: String::new(),
            session_ttl_secs: 3 * 60,
            session_location: "sessions".into(),
            session_suffix: String::new(),
            cookie_path: "/".into(),
            cookie_domain: None,
            allowed_methods: ["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            redirect_to: None,
            redirect_hosts: Vec::new(),
            authorization: None,
            pages_location: "pages".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value {value:?} for environment variable {key}")]
    Invalid { key: String, value: String },
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.into()))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.into(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Longest session lifetime accepted; browsers cap cookie lifetimes near it.
pub const MAX_SESSION_TTL_SECS: u64 = 400 * 24 * 60 * 60;

fn session_ttl(secs: u64) -> Result<u64, ConfigError> {
    if (1..=MAX_SESSION_TTL_SECS).contains(&secs) {
        Ok(secs)
    } else {
        Err(ConfigError::Invalid {
            key: "SESSION_TTL_SECS".into(),
            value: secs.to_string(),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
