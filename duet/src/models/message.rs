use anyhow::anyhow;
use duet_core::{ChatId, Identity};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tokio_sqlite::Value;
use uuid::Uuid;

use super::{
    ColumnIndex, DateTime, value_as_chat_id, value_as_datetime, value_as_i64, value_as_identity,
    value_as_string, value_as_string_opt, value_as_uuid,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    // Storage row id, reflects arrival order.
    pub id: i64,
    pub chat_id: ChatId,
    pub message_id: Uuid,
    pub author: Identity,
    pub kind: MessageKind,
    // Avatar of the author at the time of writing.
    pub photo_url: Option<String>,
    pub create_time: DateTime,
}

impl Message {
    pub fn columns() -> &'static ColumnIndex {
        lazy_static! {
            static ref COLUMNS: ColumnIndex = ColumnIndex::builder()
                .add("id")
                .add("chat_id")
                .add("message_id")
                .add("author")
                .add("kind")
                .add("content")
                .add("photo_url")
                .add("create_time")
                .build();
        }
        &COLUMNS
    }

    pub fn direction(&self, me: &Identity) -> Direction {
        if self.author == *me {
            Direction::Sent
        } else {
            Direction::Received
        }
    }

    pub fn values(&self, columns: &ColumnIndex) -> Vec<Value> {
        let mut values = columns.new_values();
        columns.set_value(&mut values, "id", self.id);
        columns.set_value(&mut values, "chat_id", self.chat_id.to_string());
        columns.set_value(&mut values, "message_id", self.message_id.to_string());
        columns.set_value(&mut values, "author", self.author.to_string());
        columns.set_value(&mut values, "kind", self.kind.name().to_string());
        columns.set_value(&mut values, "content", self.kind.content());
        columns.set_value(&mut values, "photo_url", self.photo_url.clone());
        columns.set_value(&mut values, "create_time", self.create_time.micros());
        values
    }

    pub fn from_values(values: Vec<Value>, columns: &ColumnIndex) -> Result<Self, anyhow::Error> {
        let kind = value_as_string(columns.value(&values, "kind")?)?;
        let content = value_as_string(columns.value(&values, "content")?)?;
        Ok(Self {
            id: value_as_i64(columns.value(&values, "id")?)?,
            chat_id: value_as_chat_id(columns.value(&values, "chat_id")?)?,
            message_id: value_as_uuid(columns.value(&values, "message_id")?)?,
            author: value_as_identity(columns.value(&values, "author")?)?,
            kind: MessageKind::parse(kind, content)?,
            photo_url: value_as_string_opt(columns.value(&values, "photo_url")?)?,
            create_time: value_as_datetime(columns.value(&values, "create_time")?)?,
        })
    }
}

/// Which side of the conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text(String),
}

impl MessageKind {
    pub fn name(&self) -> &str {
        match self {
            Self::Text(_) => "text",
        }
    }

    pub fn content(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    pub fn parse(kind: String, content: String) -> Result<Self, anyhow::Error> {
        match kind.as_str() {
            "text" => Ok(Self::Text(content)),
            _ => Err(anyhow!("Unknown message kind: {}", kind)),
        }
    }
}
