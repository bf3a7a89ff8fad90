use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use duet_core::Identity;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex as TokioMutex;
use tokio_sqlite::Value;

use crate::models::Config;
use crate::storage::Storage;

/// Simple configuration manager backed by the `"config"` table.
/// Keys used:
/// - `"identity"`: String (email of the signed-in identity)
/// - `"photo_url"`: String (avatar of the signed-in identity)
/// - `"write_timeout_ms"`: Number (bound for every store write)
pub struct ConfigManager {
    storage: Arc<TokioMutex<Storage>>,
}

impl ConfigManager {
    const IDENTITY: &'static str = "identity";
    const PHOTO_URL: &'static str = "photo_url";
    const WRITE_TIMEOUT_MS: &'static str = "write_timeout_ms";

    /// Create a new ConfigManager. Does not perform I/O.
    pub fn new(storage: Arc<TokioMutex<Storage>>) -> Self {
        Self { storage }
    }

    /// Load the identity that was signed in last, if any.
    pub async fn get_identity(&self) -> Result<Option<Identity>, anyhow::Error> {
        self.get_typed(Self::IDENTITY).await
    }

    /// Persist the signed-in identity, or forget it with `None`.
    pub async fn set_identity(&self, identity: Option<&Identity>) -> Result<(), anyhow::Error> {
        match identity {
            Some(identity) => self.set_typed(Self::IDENTITY, identity).await,
            None => self.delete_config(Self::IDENTITY).await,
        }
    }

    pub async fn get_photo_url(&self) -> Result<Option<String>, anyhow::Error> {
        self.get_typed(Self::PHOTO_URL).await
    }

    pub async fn set_photo_url(&self, photo_url: Option<&str>) -> Result<(), anyhow::Error> {
        match photo_url {
            Some(photo_url) => self.set_typed(Self::PHOTO_URL, &photo_url).await,
            None => self.delete_config(Self::PHOTO_URL).await,
        }
    }

    /// Read the write timeout, falling back to [`crate::DEFAULT_WRITE_TIMEOUT`].
    pub async fn get_write_timeout(&self) -> Result<Duration, anyhow::Error> {
        let millis: Option<u64> = self.get_typed(Self::WRITE_TIMEOUT_MS).await?;
        Ok(millis
            .map(Duration::from_millis)
            .unwrap_or(crate::DEFAULT_WRITE_TIMEOUT))
    }

    pub async fn set_write_timeout(&self, timeout: Duration) -> Result<(), anyhow::Error> {
        if timeout.is_zero() {
            return Err(anyhow!("Write timeout must be positive"));
        }
        let millis = u64::try_from(timeout.as_millis())?;
        self.set_typed(Self::WRITE_TIMEOUT_MS, &millis).await
    }

    /// All stored settings ordered by key.
    pub async fn list(&self) -> Result<Vec<Config>, anyhow::Error> {
        self.ensure_tables().await?;
        let columns = Config::columns();
        let query = format!(
            "SELECT {} FROM \"config\" ORDER BY \"key\"",
            columns.format()
        );
        let mut storage = self.storage.lock().await;
        let conn = storage.connection().await;
        let mut rows = conn.query(query, Vec::new()).await?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await {
            let row = row?;
            result.push(Config::from_values(row.into_values(), columns)?);
        }
        Ok(result)
    }

    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, anyhow::Error> {
        match self.get_config(key).await? {
            Some(config) => {
                let value = serde_json::from_value(config.value)
                    .map_err(|e| anyhow!("Failed to parse config '{}': {}", key, e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<(), anyhow::Error> {
        let value = serde_json::to_value(value)
            .map_err(|e| anyhow!("Failed to serialize config '{}': {}", key, e))?;
        self.upsert_config(key, value).await
    }

    async fn ensure_tables(&self) -> Result<(), anyhow::Error> {
        let mut storage = self.storage.lock().await;
        let conn = storage.connection().await;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS \"config\" (
                \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,
                \"key\" TEXT NOT NULL UNIQUE,
                \"value\" TEXT NOT NULL
            )",
            Vec::<Value>::new(),
        )
        .await
        .map_err(|e| anyhow!("Failed to create config table: {}", e))?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<Config>, anyhow::Error> {
        self.ensure_tables().await?;
        let columns = Config::columns();
        let query = format!(
            "SELECT {} FROM \"config\" WHERE \"key\" = ?1 LIMIT 1",
            columns.format()
        );
        let mut storage = self.storage.lock().await;
        let conn = storage.connection().await;
        let row = conn
            .query_row(query, vec![Value::Text(key.to_string())])
            .await
            .map_err(|e| anyhow!("Failed to query config '{}': {}", key, e))?;
        match row {
            Some(row) => Ok(Some(Config::from_values(row.into_values(), columns)?)),
            None => Ok(None),
        }
    }

    async fn upsert_config(&self, key: &str, value: serde_json::Value) -> Result<(), anyhow::Error> {
        self.ensure_tables().await?;
        let mut storage = self.storage.lock().await;
        let conn = storage.connection().await;
        // Try UPDATE first
        let update_status = conn
            .execute(
                "UPDATE \"config\" SET \"value\" = ?1 WHERE \"key\" = ?2",
                vec![Value::Text(value.to_string()), Value::Text(key.to_string())],
            )
            .await
            .map_err(|e| anyhow!("Failed to update config '{}': {}", key, e))?;
        if update_status.rows_affected() == 0 {
            // No row updated; perform INSERT
            conn.execute(
                "INSERT INTO \"config\" (\"key\", \"value\") VALUES (?1, ?2)",
                vec![Value::Text(key.to_string()), Value::Text(value.to_string())],
            )
            .await
            .map_err(|e| anyhow!("Failed to insert config '{}': {}", key, e))?;
        }
        Ok(())
    }

    async fn delete_config(&self, key: &str) -> Result<(), anyhow::Error> {
        self.ensure_tables().await?;
        let mut storage = self.storage.lock().await;
        let conn = storage.connection().await;
        conn.execute(
            "DELETE FROM \"config\" WHERE \"key\" = ?1",
            vec![Value::Text(key.to_string())],
        )
        .await
        .map_err(|e| anyhow!("Failed to delete config '{}': {}", key, e))?;
        Ok(())
    }
}

/// Directory holding the store when none is given explicitly.
///
/// `DUET_DATA_DIR` overrides the platform data directory.
pub fn default_data_dir() -> Result<PathBuf, anyhow::Error> {
    if let Some(dir) = std::env::var_os("DUET_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base_dir = dirs::data_dir()
        .or_else(dirs::config_dir)
        .ok_or(anyhow!("Cannot determine data directory"))?;
    Ok(base_dir.join("duet"))
}
