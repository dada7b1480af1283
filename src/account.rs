//! Account records persisted through `Storage`.
//!
//! An account is created the first time a user signs in through an
//! identity provider. Each browser the user signs in from is a `Device`,
//! keyed by a name-based UUID of its user-agent string so the same browser
//! always maps to the same device.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::storage::{Storage, StorageError, join_key};
use crate::validation;

/// Storage prefix for account records.
pub const ACCOUNTS_LOCATION: &str = "accounts";

const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Apple,
    Google,
}

impl FromStr for Provider {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apple" => Ok(Provider::Apple),
            "google" => Ok(Provider::Google),
            other => Err(AccountError::ProviderNotFound(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub google_id: String,
    #[serde(default)]
    pub apple_id: String,
    #[serde(default)]
    pub devices: HashMap<String, Device>,
}

impl Account {
    /// Set the contact email after validating it.
    pub fn set_email(&mut self, email: &str) -> Result<(), AccountError> {
        let email = validation::email(email)
            .ok_or_else(|| AccountError::Invalid(format!("email {email:?}")))?;
        self.email = email.to_string();
        Ok(())
    }

    /// Set first and last name; each must fit in 256 bytes.
    pub fn set_name(&mut self, first: &str, last: &str) -> Result<(), AccountError> {
        for (field, value) in [("first_name", first), ("last_name", last)] {
            if !validation::max_len(value, MAX_NAME_LEN) {
                return Err(AccountError::Invalid(format!("{field} is too long")));
            }
        }
        self.first_name = first.to_string();
        self.last_name = last.to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub oidc_provider: String,
    pub session_id: String,
    pub user_agent: String,
}

impl Device {
    pub fn new(user_agent: &str, session_id: &str, oidc_provider: &str) -> Self {
        Self {
            id: device_id(user_agent),
            oidc_provider: oidc_provider.to_string(),
            session_id: session_id.to_string(),
            user_agent: user_agent.to_string(),
        }
    }
}

/// UUID v5 in the OID namespace over the user-agent bytes.
pub fn device_id(user_agent: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, user_agent.as_bytes()).to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("no provider by the name {0} is supported")]
    ProviderNotFound(String),

    #[error("could not find an account with ID {0}")]
    AccountNotFound(String),

    #[error("invalid account field: {0}")]
    Invalid(String),

    #[error("could not decode account record: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("could not encode account record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Storage(StorageError),
}

/// Creates, finds and updates account records.
pub struct AccountStore<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> AccountStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Storage key of an account record.
    pub fn location(&self, id: &str) -> String {
        join_key(ACCOUNTS_LOCATION, &format!("{id}.json"))
    }

    /// Make a new account linked to `provider_id` at `provider` and
    /// registered with `device`.
    pub async fn add(
        &self,
        provider_id: &str,
        provider: &str,
        device: Device,
    ) -> Result<Account, AccountError> {
        let provider: Provider = provider.parse()?;

        let mut account = Account {
            id: uuid::Uuid::now_v7().to_string(),
            ..Account::default()
        };
        match provider {
            Provider::Apple => account.apple_id = provider_id.to_string(),
            Provider::Google => account.google_id = provider_id.to_string(),
        }
        account.devices.insert(device.id.clone(), device);

        self.save(&account).await?;
        tracing::info!("account {} added via {:?}", account.id, provider);
        Ok(account)
    }

    pub async fn lookup(&self, id: &str) -> Result<Account, AccountError> {
        let bytes = self.storage.load(&self.location(id)).await.map_err(|e| {
            if e.is_not_found() {
                AccountError::AccountNotFound(id.to_string())
            } else {
                AccountError::Storage(e)
            }
        })?;

        serde_json::from_slice(&bytes).map_err(AccountError::Decode)
    }

    pub async fn save(&self, account: &Account) -> Result<(), AccountError> {
        let bytes = serde_json::to_vec(account).map_err(AccountError::Encode)?;
        self.storage
            .save(&self.location(&account.id), &bytes)
            .await
            .map_err(AccountError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";

    fn store() -> AccountStore<MemoryStorage> {
        AccountStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_device_id_is_stable() {
        let a = Device::new(UA, "s1", "google");
        let b = Device::new(UA, "s2", "apple");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, device_id("curl/8.0"));

        let parsed = uuid::Uuid::parse_str(&a.id).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
    }

    #[test]
    fn test_location() {
        assert_eq!(store().location("1234"), "accounts/1234.json");
    }

    #[tokio::test]
    async fn test_add_google_account() {
        let store = store();
        let device = Device::new(UA, "session-1", "google");
        let account = store.add("1234", "google", device.clone()).await.unwrap();

        assert_eq!(account.google_id, "1234");
        assert!(account.apple_id.is_empty());
        assert_eq!(account.devices.get(&device.id), Some(&device));
        assert_eq!(
            uuid::Uuid::parse_str(&account.id).unwrap().get_version_num(),
            7
        );
    }

    #[tokio::test]
    async fn test_add_apple_account() {
        let account = store()
            .add("000123.abc", "apple", Device::default())
            .await
            .unwrap();
        assert_eq!(account.apple_id, "000123.abc");
        assert!(account.google_id.is_empty());
    }

    #[tokio::test]
    async fn test_add_unknown_provider() {
        let err = store()
            .add("1234", "myspace", Device::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::ProviderNotFound(p) if p == "myspace"));
    }

    #[tokio::test]
    async fn test_lookup_after_add() {
        let store = store();
        let added = store
            .add("1234", "google", Device::new(UA, "s", "google"))
            .await
            .unwrap();

        let found = store.lookup(&added.id).await.unwrap();
        assert_eq!(found, added);
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let err = store().lookup("nope").await.unwrap_err();
        assert!(matches!(err, AccountError::AccountNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_lookup_reads_sparse_record() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save("accounts/1234.json", br#"{"id":"1234","email":"a@b.co"}"#)
            .await
            .unwrap();

        let account = AccountStore::new(storage).lookup("1234").await.unwrap();
        assert_eq!(account.id, "1234");
        assert_eq!(account.email, "a@b.co");
        assert!(account.devices.is_empty());
    }

    #[tokio::test]
    async fn test_save_updates_record() {
        let store = store();
        let mut account = store.add("1", "google", Device::default()).await.unwrap();
        account.set_email(" jane@example.com ").unwrap();
        account.set_name("Jane", "Doe").unwrap();
        store.save(&account).await.unwrap();

        let found = store.lookup(&account.id).await.unwrap();
        assert_eq!(found.email, "jane@example.com");
        assert_eq!(found.first_name, "Jane");
    }

    #[test]
    fn test_field_validation() {
        let mut account = Account::default();
        assert!(matches!(
            account.set_email("not an email"),
            Err(AccountError::Invalid(_))
        ));
        assert!(account.set_name(&"x".repeat(257), "Doe").is_err());
        assert!(account.email.is_empty());
        assert!(account.first_name.is_empty());
    }
}
