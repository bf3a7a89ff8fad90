use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use tokio_sqlite::{Connection, Value};

use crate::error::ClientError;

/// Handle to the local document store.
///
/// The store lives in a single SQLite file inside the data directory.
/// Access is serialized by wrapping the handle in a `tokio::sync::Mutex`.
pub struct Storage {
    path: PathBuf,
    connection: Connection,
}

impl Storage {
    const DATA_FILE: &'static str = "duet.db";

    /// Opens the store in `path`, creating the directory and file if needed.
    pub async fn open(path: &Path) -> Result<Self, anyhow::Error> {
        let path = path.to_owned();
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Failed to create data directory {}", path.display()))?;
        let data_path = path.join(Self::DATA_FILE);
        let mut connection = Connection::open(&data_path)
            .await
            .with_context(|| format!("Failed to open {}", data_path.display()))?;
        Self::configure_connection(&mut connection).await?;
        tracing::debug!(path = %data_path.display(), "Opened storage");
        Ok(Self { path, connection })
    }

    /// Opens a fresh store in `path`, dropping any previous data file.
    pub async fn create(path: &Path) -> Result<Self, anyhow::Error> {
        let data_path = path.join(Self::DATA_FILE);
        drop(tokio::fs::remove_file(&data_path).await);
        Self::open(path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn connection(&mut self) -> &mut Connection {
        &mut self.connection
    }

    async fn configure_connection(connection: &mut Connection) -> Result<(), anyhow::Error> {
        connection
            .execute("PRAGMA foreign_keys = ON", Vec::<Value>::new())
            .await
            .context("Failed to enable foreign keys")?;
        Ok(())
    }
}

/// Runs a store write, failing with [`ClientError::StorageUnavailable`] when
/// it errors or does not finish within `timeout`.
pub async fn write_with_timeout<T, F>(timeout: Duration, write: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, anyhow::Error>>,
{
    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result.map_err(ClientError::storage),
        Err(_) => {
            tracing::warn!(?timeout, "Storage write timed out");
            Err(ClientError::storage(anyhow!(
                "Write did not complete within {timeout:?}"
            )))
        }
    }
}

/// Write bound shared by a manager and every handle it gave out.
#[derive(Clone, Debug)]
pub struct WriteTimeout(Arc<AtomicU64>);

impl WriteTimeout {
    pub fn new(timeout: Duration) -> Self {
        Self(Arc::new(AtomicU64::new(Self::to_nanos(timeout))))
    }

    pub fn get(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, timeout: Duration) {
        self.0.store(Self::to_nanos(timeout), Ordering::Relaxed);
    }

    fn to_nanos(timeout: Duration) -> u64 {
        u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

impl Default for WriteTimeout {
    fn default() -> Self {
        Self::new(crate::DEFAULT_WRITE_TIMEOUT)
    }
}
