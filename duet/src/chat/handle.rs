use std::sync::Arc;
use anyhow::{Context as _, anyhow};
use duet_core::{ChatId, Identity, Membership as _, Recipient};
use tokio::sync::{Mutex as TokioMutex, broadcast};
use tokio_sqlite::Value;
use uuid::Uuid;

use crate::error::ClientError;
use crate::models::{Chat, DateTime, Message, MessageKind};
use crate::storage::{Storage, WriteTimeout, write_with_timeout};

use super::{ChatEvent, ChatListener, MessageSubscription};

#[derive(Clone)]
pub struct ChatHandle {
    inner: Arc<ChatHandleInner>,
}

impl std::fmt::Debug for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHandle")
            .field("chat", &self.inner.chat)
            .finish_non_exhaustive()
    }
}

impl ChatHandle {
    pub(crate) fn new(
        chat: Chat,
        storage: Arc<TokioMutex<Storage>>,
        events: broadcast::Sender<ChatEvent>,
        listener: Arc<dyn ChatListener>,
        write_timeout: WriteTimeout,
    ) -> Self {
        Self {
            inner: Arc::new(ChatHandleInner {
                chat,
                storage,
                events,
                listener,
                write_timeout,
            }),
        }
    }

    pub fn id(&self) -> ChatId {
        self.inner.chat.id
    }

    pub fn chat(&self) -> &Chat {
        &self.inner.chat
    }

    pub fn members(&self) -> &[Identity; 2] {
        &self.inner.chat.members
    }

    pub fn recipient(&self, me: Option<&Identity>) -> Recipient {
        self.inner.chat.recipient(me)
    }

    /// Appends a message authored by `author`, who must be a member.
    ///
    /// The timestamp is assigned at write time and is strictly greater than
    /// the timestamp of every message already in the chat.
    pub async fn send_message(
        &self,
        author: &Identity,
        kind: MessageKind,
        photo_url: Option<String>,
    ) -> Result<Message, ClientError> {
        if kind.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if !self.inner.chat.has_member(author.as_str()) {
            return Err(ClientError::NotMember(self.id()));
        }
        let message = Message {
            id: 0,
            chat_id: self.id(),
            message_id: Uuid::now_v7(),
            author: author.clone(),
            kind,
            photo_url,
            create_time: DateTime::now(),
        };
        let message = write_with_timeout(
            self.inner.write_timeout.get(),
            Self::append_message(self.inner.storage.as_ref(), message),
        )
        .await?;
        tracing::debug!(chat_id = %message.chat_id, message_id = %message.message_id, "Appended message");
        self.inner
            .listener
            .on_message_appended(message.chat_id, message.clone())
            .await;
        _ = self
            .inner
            .events
            .send(ChatEvent::MessageAppended(message.clone()));
        Ok(message)
    }

    /// Load the most recent `limit` messages, oldest first.
    pub async fn load_history(&self, limit: usize) -> Result<Vec<Message>, ClientError> {
        let mut messages = Self::get_messages(self.inner.storage.as_ref(), self.id(), Some(limit))
            .await
            .map_err(ClientError::storage)?;
        messages.reverse();
        Ok(messages)
    }

    /// All messages of the chat, oldest first.
    pub async fn messages(&self) -> Result<Vec<Message>, ClientError> {
        let mut messages = Self::get_messages(self.inner.storage.as_ref(), self.id(), None)
            .await
            .map_err(ClientError::storage)?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn last_message(&self) -> Result<Option<Message>, ClientError> {
        let messages = Self::get_messages(self.inner.storage.as_ref(), self.id(), Some(1))
            .await
            .map_err(ClientError::storage)?;
        Ok(messages.into_iter().next())
    }

    /// Live messages appended to this chat after the call.
    pub fn subscribe(&self) -> MessageSubscription {
        MessageSubscription::new(self.id(), self.inner.events.subscribe())
    }

    // Newest first.
    async fn get_messages(
        storage: &TokioMutex<Storage>,
        chat_id: ChatId,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, anyhow::Error> {
        let columns = Message::columns();
        let query = format!(
            "SELECT {} FROM \"message\" \
             WHERE \"chat_id\" = ?1 \
             ORDER BY \"create_time\" DESC, \"id\" DESC \
             LIMIT ?2",
            columns.format()
        );
        // Negative LIMIT means no limit in SQLite.
        let limit = limit.map(|v| v as i64).unwrap_or(-1);
        let values = vec![Value::Text(chat_id.to_string()), Value::Integer(limit)];
        let mut storage = storage.lock().await;
        let conn = storage.connection().await;
        let mut rows = conn.query(query, values).await?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await {
            let row = row?;
            let message = Message::from_values(row.into_values(), columns)?;
            result.push(message);
        }
        Ok(result)
    }

    async fn append_message(
        storage: &TokioMutex<Storage>,
        mut message: Message,
    ) -> Result<Message, anyhow::Error> {
        let columns = Message::columns().without("id");
        let mut storage = storage.lock().await;
        let connection = storage.connection().await;
        // The lock is held until the insert, so no other append can slip in.
        let head = connection
            .query_row(
                "SELECT MAX(\"create_time\") FROM \"message\" WHERE \"chat_id\" = ?1",
                vec![Value::Text(message.chat_id.to_string())],
            )
            .await?
            .and_then(|row| row.into_values().into_iter().next());
        let head = match head {
            Some(Value::Integer(micros)) => Some(micros),
            Some(Value::Null) | None => None,
            Some(v) => return Err(anyhow!("Failed to parse create_time from value: {v:?}")),
        };
        if let Some(head) = head {
            if message.create_time.micros() <= head {
                message.create_time = DateTime::from_micros(head + 1)
                    .ok_or(anyhow!("Message timestamp out of range"))?;
            }
        }
        let values = message.values(&columns);
        let query = format!(
            "INSERT INTO \"message\" ({}) VALUES ({})",
            columns.format(),
            columns.placeholders(),
        );
        let status = connection
            .execute(query, values)
            .await
            .context("Failed to insert message")?;
        message.id = status
            .last_insert_id()
            .ok_or(anyhow!("Cannot retrieve message id"))?;
        Ok(message)
    }
}

struct ChatHandleInner {
    chat: Chat,
    storage: Arc<TokioMutex<Storage>>,
    events: broadcast::Sender<ChatEvent>,
    listener: Arc<dyn ChatListener>,
    write_timeout: WriteTimeout,
}
