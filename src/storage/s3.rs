//! S3 object storage.
//!
//! Objects live at `<prefix>/<key>` in a single bucket. Using the site
//! domain as the prefix keeps several sites from colliding in one bucket.
//! Every call is bounded by `timeout` so a hung endpoint cannot wedge a
//! request.

use std::time::Duration;

use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ChecksumAlgorithm, ChecksumMode, ServerSideEncryption};

use super::{Storage, StorageError, check_key, deadline, join_key};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BucketStorage {
    client: Client,
    bucket: String,
    prefix: String,
    timeout: Duration,
}

impl BucketStorage {
    /// Credentials and region are picked up by the AWS SDK from the
    /// environment.
    pub fn new(client: Client, bucket: String) -> Self {
        Self {
            client,
            bucket,
            prefix: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Prepend `prefix` to every key.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl Storage for BucketStorage {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;
        let full_key = self.location(key);
        tracing::info!("loading object from key {}", full_key);

        deadline(self.timeout, &full_key, async {
            let object = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .checksum_mode(ChecksumMode::Enabled)
                .send()
                .await
                .map_err(|e| {
                    let e = e.into_service_error();
                    if e.is_no_such_key() {
                        StorageError::NotFound(full_key.clone())
                    } else {
                        StorageError::Backend(format!(
                            "cannot load object key {} in bucket {}: {}",
                            full_key,
                            self.bucket,
                            DisplayErrorContext(&e)
                        ))
                    }
                })?;

            let body = object.body.collect().await.map_err(|e| {
                StorageError::Backend(format!("cannot read object {full_key}: {e}"))
            })?;
            Ok(body.into_bytes().to_vec())
        })
        .await
    }

    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        let full_key = self.location(key);
        tracing::info!("saving object to key {}", full_key);

        deadline(self.timeout, &full_key, async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .body(ByteStream::from(data.to_vec()))
                .checksum_algorithm(ChecksumAlgorithm::Crc32)
                .server_side_encryption(ServerSideEncryption::Aes256)
                .send()
                .await
                .map_err(|e| {
                    StorageError::Backend(format!(
                        "cannot put object {}: {}",
                        full_key,
                        DisplayErrorContext(&e)
                    ))
                })?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        let full_key = self.location(key);

        deadline(self.timeout, &full_key, async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(|e| {
                    StorageError::Backend(format!(
                        "cannot delete object {}: {}",
                        full_key,
                        DisplayErrorContext(&e)
                    ))
                })?;
            Ok(())
        })
        .await
    }

    async fn exist(&self, key: &str) -> bool {
        if check_key(key).is_err() {
            return false;
        }
        let full_key = self.location(key);

        let head = deadline(self.timeout, &full_key, async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))
        })
        .await;

        match head {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("object {} not available: {}", full_key, e);
                false
            }
        }
    }

    async fn list(&self, location: &str) -> Result<Vec<String>, StorageError> {
        let base = self.location(location.trim_matches('/'));
        let list_prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{base}/")
        };

        deadline(self.timeout, &list_prefix, async {
            let mut names = Vec::new();
            let mut token: Option<String> = None;

            loop {
                let page = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&list_prefix)
                    .delimiter("/")
                    .set_continuation_token(token.take())
                    .send()
                    .await
                    .map_err(|e| {
                        StorageError::Backend(format!(
                            "cannot list objects under {}: {}",
                            list_prefix,
                            DisplayErrorContext(&e)
                        ))
                    })?;

                for object in page.contents() {
                    if let Some(name) = object
                        .key()
                        .and_then(|k| k.strip_prefix(list_prefix.as_str()))
                        .filter(|n| !n.is_empty())
                    {
                        names.push(name.to_string());
                    }
                }
                for common in page.common_prefixes() {
                    if let Some(name) = common
                        .prefix()
                        .and_then(|p| p.strip_prefix(list_prefix.as_str()))
                        .map(|n| n.trim_end_matches('/'))
                        .filter(|n| !n.is_empty())
                    {
                        names.push(name.to_string());
                    }
                }

                match page.next_continuation_token() {
                    Some(next) if page.is_truncated().unwrap_or(false) => {
                        token = Some(next.to_string());
                    }
                    _ => break,
                }
            }

            names.sort();
            names.dedup();
            Ok(names)
        })
        .await
    }

    fn location(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }
}
