use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("file {0} not found, save unsuccessful")]
    SessionNotFound(String),

    #[error("error during file {path} create: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not save chunk to {identifier}: {source}")]
    Write {
        identifier: String,
        #[source]
        source: std::io::Error,
    },
}

struct FileRecord {
    handle: Mutex<File>,
    created_at: DateTime<Utc>,
}

/// Open upload files keyed by their storage identifier.
///
/// The registry is the only owner of the handles: callers open, write and close
/// through it and never see the `File` itself. Chunk writes share the read lock,
/// opening and closing take the write lock.
pub struct UploadRegistry {
    upload_dir: PathBuf,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl UploadRegistry {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn path_of(&self, identifier: &str) -> PathBuf {
        self.upload_dir.join(identifier)
    }

    /// Opens `identifier` for appending. Opening a file that is already open is a no-op.
    pub async fn open(&self, identifier: &str) -> Result<(), RegistryError> {
        let mut files = self.files.write().await;

        if files.contains_key(identifier) {
            tracing::debug!("file {} already open", identifier);
            return Ok(());
        }

        let path = self.path_of(identifier);
        let handle = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|source| RegistryError::Create {
                path: path.clone(),
                source,
            })?;

        files.insert(
            identifier.to_string(),
            FileRecord {
                handle: Mutex::new(handle),
                created_at: Utc::now(),
            },
        );

        tracing::info!("file {} created", path.display());
        Ok(())
    }

    /// Appends `chunk` to an open file.
    pub async fn write(&self, identifier: &str, chunk: &[u8]) -> Result<(), RegistryError> {
        let files = self.files.read().await;

        let record = files
            .get(identifier)
            .ok_or_else(|| RegistryError::SessionNotFound(identifier.to_string()))?;

        let mut handle = record.handle.lock().await;
        let res = match handle.write_all(chunk).await {
            Ok(()) => handle.flush().await,
            Err(e) => Err(e),
        };

        res.map_err(|source| RegistryError::Write {
            identifier: identifier.to_string(),
            source,
        })
    }

    /// Releases the handle of `identifier`. Returns `false` when nothing was open.
    pub async fn close(&self, identifier: &str) -> bool {
        let record = self.files.write().await.remove(identifier);

        let Some(record) = record else {
            return false;
        };

        let mut handle = record.handle.into_inner();
        if let Err(e) = handle.flush().await {
            tracing::error!("error when closing file {}: {}", identifier, e);
        }
        drop(handle);

        tracing::debug!("file {} closed", identifier);
        true
    }

    pub async fn is_open(&self, identifier: &str) -> bool {
        self.files.read().await.contains_key(identifier)
    }

    pub async fn open_sessions(&self) -> usize {
        self.files.read().await.len()
    }

    /// Identifiers of sessions opened more than `max_age` ago, oldest first.
    pub async fn stale_sessions(&self, max_age: Duration) -> Vec<(String, DateTime<Utc>)> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Vec::new();
        };

        let mut stale: Vec<_> = self
            .files
            .read()
            .await
            .iter()
            .filter(|(_, record)| record.created_at < cutoff)
            .map(|(id, record)| (id.clone(), record.created_at))
            .collect();

        stale.sort_by_key(|(_, created_at)| *created_at);
        stale
    }
}
