//! DynamoDB storage for production/Lambda deployments.
//!
//! Table schema:
//! - `key` (S): partition key, the full storage key
//! - `data` (B): the raw bytes
//! - `updated_at` (N): Unix timestamp of the last write
//!
//! Expired sessions are not deleted here; expiration is enforced when a
//! session is read.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;

use super::{Storage, StorageError, check_key, deadline, immediate_children};

const KEY_ATTR: &str = "key";
const DATA_ATTR: &str = "data";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TableStorage {
    client: Client,
    table_name: String,
    timeout: Duration,
}

impl TableStorage {
    pub fn new(client: Client, table_name: String) -> Self {
        Self {
            client,
            table_name,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut start: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut scan = self
                .client
                .scan()
                .table_name(&self.table_name)
                .projection_expression("#k")
                .expression_attribute_names("#k", KEY_ATTR)
                .set_exclusive_start_key(start.take());
            if !prefix.is_empty() {
                scan = scan
                    .filter_expression("begins_with(#k, :p)")
                    .expression_attribute_values(":p", AttributeValue::S(prefix.to_string()));
            }

            let page = scan.send().await.map_err(|e| {
                StorageError::Backend(format!(
                    "cannot scan table {}: {}",
                    self.table_name,
                    DisplayErrorContext(&e)
                ))
            })?;

            for item in page.items() {
                if let Some(Ok(key)) = item.get(KEY_ATTR).map(|v| v.as_s()) {
                    keys.push(key.clone());
                }
            }

            match page.last_evaluated_key() {
                Some(last) => start = Some(last.clone()),
                None => break,
            }
        }

        Ok(keys)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Storage for TableStorage {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;

        deadline(self.timeout, key, async {
            let result = self
                .client
                .get_item()
                .table_name(&self.table_name)
                .key(KEY_ATTR, AttributeValue::S(key.to_string()))
                .consistent_read(true)
                .send()
                .await
                .map_err(|e| {
                    StorageError::Backend(format!(
                        "cannot get item {} from table {}: {}",
                        key,
                        self.table_name,
                        DisplayErrorContext(&e)
                    ))
                })?;

            let item = result
                .item()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

            let data = item
                .get(DATA_ATTR)
                .and_then(|v| v.as_b().ok())
                .ok_or_else(|| {
                    StorageError::Backend(format!("item {key} has no binary {DATA_ATTR} attribute"))
                })?;

            Ok(data.as_ref().to_vec())
        })
        .await
    }

    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;

        deadline(self.timeout, key, async {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .item(KEY_ATTR, AttributeValue::S(key.to_string()))
                .item(DATA_ATTR, AttributeValue::B(Blob::new(data.to_vec())))
                .item("updated_at", AttributeValue::N(now_secs().to_string()))
                .send()
                .await
                .map_err(|e| {
                    tracing::error!("Failed to save item {}: {}", key, DisplayErrorContext(&e));
                    StorageError::Backend(format!(
                        "cannot put item {} to table {}: {}",
                        key,
                        self.table_name,
                        DisplayErrorContext(&e)
                    ))
                })?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;

        deadline(self.timeout, key, async {
            self.client
                .delete_item()
                .table_name(&self.table_name)
                .key(KEY_ATTR, AttributeValue::S(key.to_string()))
                .condition_expression("attribute_exists(#k)")
                .expression_attribute_names("#k", KEY_ATTR)
                .send()
                .await
                .map_err(|e| {
                    let e = e.into_service_error();
                    if e.is_conditional_check_failed_exception() {
                        StorageError::NotFound(key.to_string())
                    } else {
                        StorageError::Backend(format!(
                            "cannot delete item {}: {}",
                            key,
                            DisplayErrorContext(&e)
                        ))
                    }
                })?;
            Ok(())
        })
        .await
    }

    async fn exist(&self, key: &str) -> bool {
        if check_key(key).is_err() {
            return false;
        }

        let found = deadline(self.timeout, key, async {
            self.client
                .get_item()
                .table_name(&self.table_name)
                .key(KEY_ATTR, AttributeValue::S(key.to_string()))
                .projection_expression("#k")
                .expression_attribute_names("#k", KEY_ATTR)
                .send()
                .await
                .map(|r| r.item().is_some())
                .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))
        })
        .await;

        found.unwrap_or_else(|e| {
            tracing::debug!("item {} not available: {}", key, e);
            false
        })
    }

    async fn list(&self, location: &str) -> Result<Vec<String>, StorageError> {
        let location = location.trim_matches('/');
        let prefix = if location.is_empty() {
            String::new()
        } else {
            format!("{location}/")
        };

        let keys = deadline(self.timeout, location, self.scan_keys(&prefix)).await?;
        Ok(immediate_children(location, keys.iter().map(String::as_str)))
    }

    fn location(&self, key: &str) -> String {
        key.to_string()
    }
}
