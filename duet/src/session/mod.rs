use std::sync::Arc;
use std::time::Duration;

use duet_core::{ChatId, Identity, Membership as _, Recipient, should_create_chat};
use tokio::sync::{Mutex as TokioMutex, watch};

use crate::chat::{ChatHandle, ChatListener, ChatManager, ChatSubscription, StubListener};
use crate::config::ConfigManager;
use crate::error::ClientError;
use crate::models::{Chat, LastSeen, Message, MessageKind, Presence};
use crate::presence::PresenceManager;
use crate::storage::{Storage, write_with_timeout};

/// The signed-in participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub identity: Identity,
    pub photo_url: Option<String>,
}

/// A chat as shown in the chat list of the signed-in identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEntry {
    pub chat: Chat,
    pub recipient: Recipient,
}

/// Client context of one user.
///
/// Owns the managers over a shared store and the authentication state.
/// Everything that needs the current identity goes through here.
pub struct Session {
    config: ConfigManager,
    chats: ChatManager,
    presence: PresenceManager,
    account_tx: watch::Sender<Option<Account>>,
    write_timeout: Duration,
}

impl Session {
    pub async fn open(storage: Arc<TokioMutex<Storage>>) -> Result<Self, anyhow::Error> {
        Self::with_listener(storage, Arc::new(StubListener)).await
    }

    pub async fn with_listener<L>(
        storage: Arc<TokioMutex<Storage>>,
        listener: Arc<L>,
    ) -> Result<Self, anyhow::Error>
    where
        L: ChatListener + 'static,
    {
        let config = ConfigManager::new(storage.clone());
        let write_timeout = config.get_write_timeout().await?;
        let chats = ChatManager::with_listener(storage.clone(), listener).await?;
        chats.set_write_timeout(write_timeout);
        let presence = PresenceManager::new(storage).await?;
        presence.set_write_timeout(write_timeout);
        let account = match config.get_identity().await? {
            Some(identity) => {
                tracing::info!(%identity, "Restored signed-in identity");
                Some(Account {
                    identity,
                    photo_url: config.get_photo_url().await?,
                })
            }
            None => None,
        };
        let (account_tx, _) = watch::channel(account);
        Ok(Self {
            config,
            chats,
            presence,
            account_tx,
            write_timeout,
        })
    }

    pub fn chats(&self) -> &ChatManager {
        &self.chats
    }

    pub fn presence(&self) -> &PresenceManager {
        &self.presence
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn account(&self) -> Option<Account> {
        self.account_tx.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.account_tx
            .borrow()
            .as_ref()
            .map(|account| account.identity.clone())
    }

    /// Receiver that observes sign-in and sign-out.
    pub fn watch_account(&self) -> watch::Receiver<Option<Account>> {
        self.account_tx.subscribe()
    }

    /// Makes `identity` the authenticated participant and marks it active.
    ///
    /// The identity is persisted only after presence was written, so a
    /// failed sign-in is not restored by the next [`Session::open`].
    pub async fn sign_in(
        &self,
        identity: Identity,
        photo_url: Option<String>,
    ) -> Result<Presence, ClientError> {
        let presence = self.presence.touch(&identity, photo_url.clone()).await?;
        let account = Account {
            identity,
            photo_url,
        };
        self.persist_account(Some(&account)).await?;
        tracing::info!(identity = %account.identity, "Signed in");
        self.account_tx.send_replace(Some(account));
        Ok(presence)
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        self.persist_account(None).await?;
        if let Some(account) = self.account_tx.send_replace(None) {
            tracing::info!(identity = %account.identity, "Signed out");
        }
        Ok(())
    }

    // The identity key is written last on sign-in and cleared first on
    // sign-out; it alone decides what is restored.
    async fn persist_account(&self, account: Option<&Account>) -> Result<(), ClientError> {
        write_with_timeout(self.write_timeout, async {
            match account {
                Some(account) => {
                    self.config
                        .set_photo_url(account.photo_url.as_deref())
                        .await?;
                    self.config.set_identity(Some(&account.identity)).await
                }
                None => {
                    self.config.set_identity(None).await?;
                    self.config.set_photo_url(None).await
                }
            }
        })
        .await
    }

    /// Chats of the signed-in identity with the other party resolved.
    pub async fn chat_list(&self) -> Result<Vec<ChatEntry>, ClientError> {
        let me = self.require_account()?.identity;
        let chats = self.chats.list_chats(&me).await?;
        Ok(chats
            .into_iter()
            .map(|chat| ChatEntry {
                recipient: chat.recipient(Some(&me)),
                chat,
            })
            .collect())
    }

    /// Chat list entries whose recipient contains `query`, ignoring case.
    pub async fn search_chats(&self, query: &str) -> Result<Vec<ChatEntry>, ClientError> {
        let query = query.trim().to_lowercase();
        let entries = self.chat_list().await?;
        if query.is_empty() {
            return Ok(entries);
        }
        Ok(entries
            .into_iter()
            .filter(|entry| {
                entry
                    .recipient
                    .identity()
                    .is_some_and(|identity| identity.as_str().to_lowercase().contains(&query))
            })
            .collect())
    }

    /// Starts a chat with `candidate` unless the input is rejected.
    pub async fn start_chat(&self, candidate: &str) -> Result<ChatHandle, ClientError> {
        let me = self.require_account()?.identity;
        let existing = self.chats.list_chats(&me).await?;
        let new_chat = match should_create_chat(&existing, candidate, &me) {
            Ok(new_chat) => new_chat,
            Err(rejection) => {
                tracing::debug!(%rejection, "Chat creation rejected");
                return Err(rejection.into());
            }
        };
        self.chats.create_chat(new_chat).await
    }

    pub async fn open_chat(&self, id: ChatId) -> Result<ChatHandle, ClientError> {
        self.chats
            .get_chat(id)
            .await?
            .ok_or(ClientError::ChatNotFound(id))
    }

    /// Sends `text` to chat `id` as the signed-in identity.
    ///
    /// Marks the sender active before the message is written.
    pub async fn send_message(&self, id: ChatId, text: &str) -> Result<Message, ClientError> {
        let account = self.require_account()?;
        let kind = MessageKind::Text(text.to_owned());
        if kind.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let chat = self.open_chat(id).await?;
        if !chat.chat().has_member(account.identity.as_str()) {
            tracing::debug!(chat_id = %id, identity = %account.identity, "Sender is not a chat member");
            return Err(ClientError::NotMember(id));
        }
        self.presence
            .touch(&account.identity, account.photo_url.clone())
            .await?;
        chat.send_message(&account.identity, kind, account.photo_url)
            .await
    }

    /// Presence record of the other party of `chat`.
    pub async fn recipient_presence(
        &self,
        chat: &ChatHandle,
    ) -> Result<Option<Presence>, ClientError> {
        let recipient = chat.recipient(self.identity().as_ref());
        match recipient.identity() {
            Some(recipient) => self.presence.get(recipient).await,
            None => Ok(None),
        }
    }

    pub async fn last_seen(&self, identity: &Identity) -> Result<LastSeen, ClientError> {
        self.presence.last_seen(identity).await
    }

    /// Live chat creations involving the signed-in identity.
    pub fn subscribe_chats(&self) -> Result<ChatSubscription, ClientError> {
        let me = self.require_account()?.identity;
        Ok(self.chats.subscribe(me))
    }

    fn require_account(&self) -> Result<Account, ClientError> {
        self.account().ok_or(ClientError::AuthUnavailable)
    }
}
