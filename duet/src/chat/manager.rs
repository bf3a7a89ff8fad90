use std::collections::{HashMap, hash_map};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use duet_core::{ChatId, Identity, NewChat, Rejection};
use tokio::sync::{Mutex as TokioMutex, broadcast};
use tokio_sqlite::Value;

use crate::error::ClientError;
use crate::models::{Chat, DateTime};
use crate::storage::{Storage, WriteTimeout, write_with_timeout};

use super::{ChatEvent, ChatHandle, ChatListener, ChatSubscription, StubListener};

pub struct ChatManager {
    storage: Arc<TokioMutex<Storage>>,
    chats: Arc<TokioMutex<HashMap<ChatId, ChatHandle>>>,
    events: broadcast::Sender<ChatEvent>,
    listener: Arc<dyn ChatListener>,
    write_timeout: WriteTimeout,
}

impl ChatManager {
    const MAX_EVENTS: usize = 256;

    pub async fn new(storage: Arc<TokioMutex<Storage>>) -> Result<Self, anyhow::Error> {
        Self::with_listener(storage, Arc::new(StubListener)).await
    }

    pub async fn with_listener<L>(
        storage: Arc<TokioMutex<Storage>>,
        listener: Arc<L>,
    ) -> Result<Self, anyhow::Error>
    where
        L: ChatListener + 'static,
    {
        Self::create_tables(storage.as_ref()).await?;
        let (events, _) = broadcast::channel(Self::MAX_EVENTS);
        Ok(Self {
            storage,
            chats: Arc::new(TokioMutex::new(HashMap::new())),
            events,
            listener,
            write_timeout: WriteTimeout::default(),
        })
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout.get()
    }

    /// Changes the bound for later writes, including those made through
    /// handles returned earlier.
    pub fn set_write_timeout(&self, timeout: Duration) {
        self.write_timeout.set(timeout);
    }

    /// All chats that have `identity` as a member, oldest first.
    pub async fn list_chats(&self, identity: &Identity) -> Result<Vec<Chat>, ClientError> {
        Self::get_member_chats(self.storage.as_ref(), identity)
            .await
            .map_err(ClientError::storage)
    }

    pub async fn get_chat(&self, id: ChatId) -> Result<Option<ChatHandle>, ClientError> {
        if let Some(handle) = self.chats.lock().await.get(&id) {
            return Ok(Some(handle.clone()));
        }
        let chat = Self::get_chat_row(self.storage.as_ref(), id)
            .await
            .map_err(ClientError::storage)?;
        Ok(match chat {
            Some(chat) => Some(self.cache_handle(chat).await),
            None => None,
        })
    }

    /// Looks up the chat of an unordered member pair.
    pub async fn find_chat(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<ChatHandle>, ClientError> {
        self.get_chat(ChatId::for_pair(a, b)).await
    }

    /// Persists a chat approved by [`duet_core::should_create_chat`].
    ///
    /// The chat id is the primary key, so a concurrent creation for the
    /// same pair leaves exactly one row and the loser gets
    /// [`Rejection::DuplicateChat`].
    pub async fn create_chat(&self, new_chat: NewChat) -> Result<ChatHandle, ClientError> {
        let chat = Chat::new(new_chat, DateTime::now());
        let created = write_with_timeout(
            self.write_timeout.get(),
            Self::insert_chat(self.storage.as_ref(), &chat),
        )
        .await?;
        if !created {
            tracing::debug!(id = %chat.id, "Chat already exists in storage");
            return Err(Rejection::DuplicateChat(chat.id).into());
        }
        tracing::info!(id = %chat.id, members = ?chat.members, "Created chat");
        let handle = self.cache_handle(chat.clone()).await;
        self.listener.on_chat_created(chat.clone()).await;
        // No receivers is fine.
        _ = self.events.send(ChatEvent::ChatCreated(chat));
        Ok(handle)
    }

    /// Live chat creations for `identity`.
    pub fn subscribe(&self, identity: Identity) -> ChatSubscription {
        ChatSubscription::new(identity, self.events.subscribe())
    }

    async fn cache_handle(&self, chat: Chat) -> ChatHandle {
        let mut chats = self.chats.lock().await;
        match chats.entry(chat.id) {
            hash_map::Entry::Occupied(entry) => entry.get().clone(),
            hash_map::Entry::Vacant(entry) => {
                let handle = ChatHandle::new(
                    chat,
                    self.storage.clone(),
                    self.events.clone(),
                    self.listener.clone(),
                    self.write_timeout.clone(),
                );
                entry.insert(handle.clone());
                handle
            }
        }
    }

    async fn get_member_chats(
        storage: &TokioMutex<Storage>,
        identity: &Identity,
    ) -> Result<Vec<Chat>, anyhow::Error> {
        let columns = Chat::columns();
        let query = format!(
            "SELECT {} FROM \"chat\" \
             WHERE \"member_a\" = ?1 OR \"member_b\" = ?1 \
             ORDER BY \"create_time\", \"id\"",
            columns.format()
        );
        let mut storage = storage.lock().await;
        let connection = storage.connection().await;
        let mut rows = connection
            .query(query, vec![Value::Text(identity.to_string())])
            .await?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await {
            let row = row?;
            let chat = Chat::from_values(row.into_values(), columns)?;
            result.push(chat);
        }
        Ok(result)
    }

    async fn get_chat_row(
        storage: &TokioMutex<Storage>,
        id: ChatId,
    ) -> Result<Option<Chat>, anyhow::Error> {
        let columns = Chat::columns();
        let query = format!(
            "SELECT {} FROM \"chat\" WHERE \"id\" = ?1 LIMIT 1",
            columns.format()
        );
        let mut storage = storage.lock().await;
        let connection = storage.connection().await;
        match connection
            .query_row(query, vec![Value::Text(id.to_string())])
            .await?
        {
            Some(row) => Ok(Some(Chat::from_values(row.into_values(), columns)?)),
            None => Ok(None),
        }
    }

    async fn insert_chat(storage: &TokioMutex<Storage>, chat: &Chat) -> Result<bool, anyhow::Error> {
        let columns = Chat::columns();
        let values = chat.values(columns);
        let query = format!(
            "INSERT OR IGNORE INTO \"chat\" ({}) VALUES ({})",
            columns.format(),
            columns.placeholders(),
        );
        let mut storage = storage.lock().await;
        let connection = storage.connection().await;
        let status = connection
            .execute(query, values)
            .await
            .context("Failed to insert chat")?;
        Ok(status.rows_affected() == 1)
    }

    async fn create_tables(storage: &TokioMutex<Storage>) -> Result<(), anyhow::Error> {
        let mut storage = storage.lock().await;
        let conn = storage.connection().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS \"chat\" (
                    \"id\" TEXT PRIMARY KEY,
                    \"member_a\" TEXT NOT NULL,
                    \"member_b\" TEXT NOT NULL,
                    \"create_time\" BIGINT NOT NULL
                )",
            Vec::<Value>::new(),
        )
        .await
        .context("Failed to create chat table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS chat__member_a_idx ON \"chat\" (\"member_a\")",
            Vec::<Value>::new(),
        )
        .await
        .context("Failed to create chat__member_a_idx index")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS chat__member_b_idx ON \"chat\" (\"member_b\")",
            Vec::<Value>::new(),
        )
        .await
        .context("Failed to create chat__member_b_idx index")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS \"message\" (
                    \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,
                    \"chat_id\" TEXT NOT NULL,
                    \"message_id\" TEXT NOT NULL UNIQUE,
                    \"author\" TEXT NOT NULL,
                    \"kind\" TEXT NOT NULL,
                    \"content\" TEXT NOT NULL,
                    \"photo_url\" TEXT,
                    \"create_time\" BIGINT NOT NULL,
                    FOREIGN KEY (\"chat_id\") REFERENCES \"chat\" (\"id\") ON DELETE CASCADE
                )",
            Vec::<Value>::new(),
        )
        .await
        .context("Failed to create message table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS message__chat_id_create_time_idx
                 ON \"message\" (\"chat_id\", \"create_time\", \"id\")",
            Vec::<Value>::new(),
        )
        .await
        .context("Failed to create message__chat_id_create_time_idx index")?;

        Ok(())
    }
}
