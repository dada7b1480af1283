//! Local filesystem storage rooted at a work directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Storage, StorageError, check_key};

pub struct LocalStorage {
    work_dir: PathBuf,
}

impl LocalStorage {
    /// Fails when `work_dir` is not an existing directory.
    pub fn new(work_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let work_dir = work_dir.as_ref();
        if !work_dir.is_dir() {
            return Err(StorageError::DirNotFound(work_dir.display().to_string()));
        }
        Ok(Self {
            work_dir: work_dir.to_path_buf(),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.work_dir.join(key.trim_matches('/'))
    }
}

impl Storage for LocalStorage {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;
        let path = self.path(key);
        tracing::debug!("loading {}", path.display());

        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.display().to_string()),
            _ => StorageError::Read {
                key: key.to_string(),
                source: e,
            },
        })
    }

    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        let path = self.path(key);
        tracing::debug!("saving {}", path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Write {
                    key: key.to_string(),
                    source: e,
                })?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                source: e,
            })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        let path = self.path(key);

        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StorageError::NotFound(path.display().to_string()),
                _ => StorageError::Remove {
                    key: key.to_string(),
                    source: e,
                },
            })
    }

    async fn exist(&self, key: &str) -> bool {
        if check_key(key).is_err() {
            return false;
        }
        matches!(tokio::fs::try_exists(self.path(key)).await, Ok(true))
    }

    async fn list(&self, location: &str) -> Result<Vec<String>, StorageError> {
        let dir = if location.trim_matches('/').is_empty() {
            self.work_dir.clone()
        } else {
            check_key(location)?;
            self.path(location)
        };

        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(dir.display().to_string()),
            _ => StorageError::Read {
                key: location.to_string(),
                source: e,
            },
        })?;

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(e) => {
                    return Err(StorageError::Read {
                        key: location.to_string(),
                        source: e,
                    });
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn location(&self, key: &str) -> String {
        self.path(key).display().to_string()
    }
}
