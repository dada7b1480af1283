//! Key-addressed blob storage.
//!
//! The `Storage` trait is the contract the session manager, the page
//! fallback and the account store are written against. Backends:
//! - `MemoryStorage`: development and tests
//! - `LocalStorage`: files under a work directory
//! - `BucketStorage`: S3 objects under a key prefix
//! - `TableStorage`: DynamoDB items keyed by string

pub mod dynamodb;
pub mod local;
pub mod memory;
pub mod s3;

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use crate::config::{Config, StorageKind};

/// Errors produced by any storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{0} not found in storage")]
    NotFound(String),

    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("{0} directory does not exist")]
    DirNotFound(String),

    #[error("cannot read {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove {key}: {source}")]
    Remove {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage call for {0} timed out")]
    Timeout(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Pluggable persistence contract.
///
/// `load` returns exactly the bytes passed to the last `save` for the same
/// key. `exist` never fails; lookup errors read as `false`. `list` is
/// non-recursive and returns names relative to `location`.
pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;

    fn save(&self, key: &str, data: &[u8])
    -> impl Future<Output = Result<(), StorageError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn exist(&self, key: &str) -> impl Future<Output = bool> + Send;

    fn list(&self, location: &str)
    -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;

    /// Fully-qualified backend address for a logical key. Pure; does not
    /// check for existence.
    fn location(&self, key: &str) -> String;
}

/// Type-erased storage selected at deployment time.
///
/// `Storage` uses return-position `impl Future`, so it is not object safe;
/// this enum dispatches manually instead.
pub enum AnyStorage {
    Memory(memory::MemoryStorage),
    Local(local::LocalStorage),
    Bucket(s3::BucketStorage),
    Table(dynamodb::TableStorage),
}

impl AnyStorage {
    /// Build the backend named by `config.storage_backend`.
    pub async fn from_config(config: &Config) -> Result<Self, StorageError> {
        let timeout = Duration::from_secs(config.storage_timeout_secs);
        match config.storage_backend {
            StorageKind::Memory => {
                tracing::info!("Using in-memory storage");
                Ok(AnyStorage::Memory(memory::MemoryStorage::new()))
            }
            StorageKind::Local => {
                tracing::info!("Using local storage (dir: {})", config.storage_dir);
                Ok(AnyStorage::Local(local::LocalStorage::new(
                    &config.storage_dir,
                )?))
            }
            StorageKind::S3 => {
                let sdk_config =
                    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                let client = aws_sdk_s3::Client::new(&sdk_config);
                tracing::info!(
                    "Using S3 storage (bucket: {}, prefix: {})",
                    config.s3_bucket,
                    config.s3_prefix
                );
                Ok(AnyStorage::Bucket(
                    s3::BucketStorage::new(client, config.s3_bucket.clone())
                        .with_prefix(&config.s3_prefix)
                        .with_timeout(timeout),
                ))
            }
            StorageKind::DynamoDb => {
                let sdk_config =
                    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                let client = if config.dynamodb_endpoint.is_empty() {
                    aws_sdk_dynamodb::Client::new(&sdk_config)
                } else {
                    let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                        .endpoint_url(&config.dynamodb_endpoint)
                        .build();
                    aws_sdk_dynamodb::Client::from_conf(dynamo_config)
                };
                tracing::info!("Using DynamoDB storage (table: {})", config.dynamodb_table);
                Ok(AnyStorage::Table(
                    dynamodb::TableStorage::new(client, config.dynamodb_table.clone())
                        .with_timeout(timeout),
                ))
            }
        }
    }

    /// Short backend name, reported by the health check.
    pub fn kind(&self) -> &'static str {
        match self {
            AnyStorage::Memory(_) => "memory",
            AnyStorage::Local(_) => "local",
            AnyStorage::Bucket(_) => "s3",
            AnyStorage::Table(_) => "dynamodb",
        }
    }
}

impl Storage for AnyStorage {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match self {
            AnyStorage::Memory(s) => s.load(key).await,
            AnyStorage::Local(s) => s.load(key).await,
            AnyStorage::Bucket(s) => s.load(key).await,
            AnyStorage::Table(s) => s.load(key).await,
        }
    }

    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        match self {
            AnyStorage::Memory(s) => s.save(key, data).await,
            AnyStorage::Local(s) => s.save(key, data).await,
            AnyStorage::Bucket(s) => s.save(key, data).await,
            AnyStorage::Table(s) => s.save(key, data).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self {
            AnyStorage::Memory(s) => s.remove(key).await,
            AnyStorage::Local(s) => s.remove(key).await,
            AnyStorage::Bucket(s) => s.remove(key).await,
            AnyStorage::Table(s) => s.remove(key).await,
        }
    }

    async fn exist(&self, key: &str) -> bool {
        match self {
            AnyStorage::Memory(s) => s.exist(key).await,
            AnyStorage::Local(s) => s.exist(key).await,
            AnyStorage::Bucket(s) => s.exist(key).await,
            AnyStorage::Table(s) => s.exist(key).await,
        }
    }

    async fn list(&self, location: &str) -> Result<Vec<String>, StorageError> {
        match self {
            AnyStorage::Memory(s) => s.list(location).await,
            AnyStorage::Local(s) => s.list(location).await,
            AnyStorage::Bucket(s) => s.list(location).await,
            AnyStorage::Table(s) => s.list(location).await,
        }
    }

    fn location(&self, key: &str) -> String {
        match self {
            AnyStorage::Memory(s) => s.location(key),
            AnyStorage::Local(s) => s.location(key),
            AnyStorage::Bucket(s) => s.location(key),
            AnyStorage::Table(s) => s.location(key),
        }
    }
}

/// Reject keys that could escape a backend's root: empty, absolute, or
/// containing `.`/`..` segments.
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    let trimmed = key.trim_matches('/');
    if trimmed.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || trimmed.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Join a prefix and a key with exactly one `/`. An empty prefix yields
/// the key unchanged.
pub(crate) fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else if key.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// Bound a backend call by `timeout`, mapping expiry to `Timeout(key)`.
pub(crate) async fn deadline<T, F>(timeout: Duration, key: &str, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StorageError::Timeout(key.to_string()))?
}

/// Immediate children of `prefix` among a flat set of keys.
///
/// `a/b`, `a/c/d` and `a/c/e` listed under `a` give `b` and `c`.
pub(crate) fn immediate_children<'a, I>(prefix: &str, keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = prefix.trim_matches('/');
    let mut names = BTreeSet::new();
    for key in keys {
        let rest = if prefix.is_empty() {
            Some(key)
        } else {
            key.strip_prefix(prefix).and_then(|r| r.strip_prefix('/'))
        };
        if let Some(rest) = rest
            && let Some(first) = rest.split('/').next()
            && !first.is_empty()
        {
            names.insert(first.to_string());
        }
    }
    names.into_iter().collect()
}
