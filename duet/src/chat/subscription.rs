use duet_core::{ChatId, Identity, Membership as _};
use tokio::sync::broadcast;

use crate::models::{Chat, Message};

/// Change notification published by the chat store.
#[derive(Clone, Debug)]
pub enum ChatEvent {
    ChatCreated(Chat),
    MessageAppended(Message),
}

/// Live view of chats created for one identity.
pub struct ChatSubscription {
    identity: Identity,
    rx: broadcast::Receiver<ChatEvent>,
}

impl ChatSubscription {
    pub(crate) fn new(identity: Identity, rx: broadcast::Receiver<ChatEvent>) -> Self {
        Self { identity, rx }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Waits for the next chat that has the identity as a member.
    ///
    /// Returns `None` once the store is gone. Notifications missed by a slow
    /// receiver are skipped; re-fetch the chat list to catch up.
    pub async fn recv(&mut self) -> Option<Chat> {
        loop {
            match recv_event(&mut self.rx).await? {
                ChatEvent::ChatCreated(chat) if chat.has_member(self.identity.as_str()) => {
                    return Some(chat);
                }
                _ => continue,
            }
        }
    }
}

/// Live view of messages appended to one chat, in write order.
pub struct MessageSubscription {
    chat_id: ChatId,
    rx: broadcast::Receiver<ChatEvent>,
}

impl MessageSubscription {
    pub(crate) fn new(chat_id: ChatId, rx: broadcast::Receiver<ChatEvent>) -> Self {
        Self { chat_id, rx }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match recv_event(&mut self.rx).await? {
                ChatEvent::MessageAppended(message) if message.chat_id == self.chat_id => {
                    return Some(message);
                }
                _ => continue,
            }
        }
    }
}

async fn recv_event(rx: &mut broadcast::Receiver<ChatEvent>) -> Option<ChatEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Subscriber lagged behind chat events");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
