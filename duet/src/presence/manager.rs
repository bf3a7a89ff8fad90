use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use duet_core::Identity;
use tokio::sync::Mutex as TokioMutex;
use tokio_sqlite::Value;

use crate::error::ClientError;
use crate::models::{DateTime, LastSeen, Presence};
use crate::storage::{Storage, WriteTimeout, write_with_timeout};

/// Per-identity "last active" records backed by the `"presence"` table.
pub struct PresenceManager {
    storage: Arc<TokioMutex<Storage>>,
    write_timeout: WriteTimeout,
}

impl PresenceManager {
    pub async fn new(storage: Arc<TokioMutex<Storage>>) -> Result<Self, anyhow::Error> {
        Self::create_tables(storage.as_ref()).await?;
        Ok(Self {
            storage,
            write_timeout: WriteTimeout::default(),
        })
    }

    pub fn set_write_timeout(&self, timeout: Duration) {
        self.write_timeout.set(timeout);
    }

    /// Marks `identity` as active now.
    ///
    /// A `None` avatar keeps the previously stored one.
    pub async fn touch(
        &self,
        identity: &Identity,
        photo_url: Option<String>,
    ) -> Result<Presence, ClientError> {
        let presence = Presence {
            identity: identity.clone(),
            photo_url,
            last_seen: DateTime::now(),
        };
        let presence = write_with_timeout(
            self.write_timeout.get(),
            Self::upsert_presence(self.storage.as_ref(), presence),
        )
        .await?;
        tracing::trace!(identity = %presence.identity, "Updated presence");
        Ok(presence)
    }

    pub async fn get(&self, identity: &Identity) -> Result<Option<Presence>, ClientError> {
        Self::get_presence(self.storage.as_ref(), identity)
            .await
            .map_err(ClientError::storage)
    }

    pub async fn last_seen(&self, identity: &Identity) -> Result<LastSeen, ClientError> {
        let presence = self.get(identity).await?;
        Ok(LastSeen::from(presence.as_ref()))
    }

    async fn get_presence(
        storage: &TokioMutex<Storage>,
        identity: &Identity,
    ) -> Result<Option<Presence>, anyhow::Error> {
        let columns = Presence::columns();
        let query = format!(
            "SELECT {} FROM \"presence\" WHERE \"identity\" = ?1 LIMIT 1",
            columns.format()
        );
        let mut storage = storage.lock().await;
        let connection = storage.connection().await;
        match connection
            .query_row(query, vec![Value::Text(identity.to_string())])
            .await?
        {
            Some(row) => Ok(Some(Presence::from_values(row.into_values(), columns)?)),
            None => Ok(None),
        }
    }

    async fn upsert_presence(
        storage: &TokioMutex<Storage>,
        presence: Presence,
    ) -> Result<Presence, anyhow::Error> {
        let columns = Presence::columns();
        let values = presence.values(columns);
        let query = format!(
            "INSERT INTO \"presence\" ({}) VALUES ({}) \
             ON CONFLICT (\"identity\") DO UPDATE SET \
             \"last_seen\" = excluded.\"last_seen\", \
             \"photo_url\" = COALESCE(excluded.\"photo_url\", \"presence\".\"photo_url\")",
            columns.format(),
            columns.placeholders(),
        );
        {
            let mut storage = storage.lock().await;
            let connection = storage.connection().await;
            connection
                .execute(query, values)
                .await
                .context("Failed to upsert presence")?;
        }
        // Re-read to return the merged avatar.
        let merged = Self::get_presence(storage, &presence.identity).await?;
        Ok(merged.unwrap_or(presence))
    }

    async fn create_tables(storage: &TokioMutex<Storage>) -> Result<(), anyhow::Error> {
        let mut storage = storage.lock().await;
        let conn = storage.connection().await;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS \"presence\" (
                    \"identity\" TEXT PRIMARY KEY,
                    \"photo_url\" TEXT,
                    \"last_seen\" BIGINT NOT NULL
                )",
            Vec::<Value>::new(),
        )
        .await
        .context("Failed to create presence table")?;
        Ok(())
    }
}
