use async_trait::async_trait;
use duet_core::ChatId;

use crate::models::{Chat, Message};

#[async_trait]
pub trait ChatListener: Send + Sync {
    async fn on_chat_created(&self, chat: Chat);

    async fn on_message_appended(&self, chat_id: ChatId, message: Message);
}

pub(crate) struct StubListener;

#[async_trait]
impl ChatListener for StubListener {
    async fn on_chat_created(&self, chat: Chat) {
        _ = chat;
    }

    async fn on_message_appended(&self, chat_id: ChatId, message: Message) {
        _ = chat_id;
        _ = message;
    }
}
