use crate::{ChatId, Identity};

/// Anything that carries the two-party membership of a chat.
pub trait Membership {
    fn members(&self) -> &[Identity];

    fn has_member(&self, identity: &str) -> bool {
        self.members().iter().any(|member| member == identity)
    }
}

impl Membership for [Identity; 2] {
    fn members(&self) -> &[Identity] {
        self
    }
}

/// Chat that passed every check and may be written to storage.
///
/// Only [`should_create_chat`] builds one, so the id always matches the
/// member pair and the members are distinct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewChat {
    id: ChatId,
    // Creator first, counterparty second.
    members: [Identity; 2],
}

impl NewChat {
    pub fn id(&self) -> ChatId {
        self.id
    }

    pub fn into_parts(self) -> (ChatId, [Identity; 2]) {
        (self.id, self.members)
    }
}

impl Membership for NewChat {
    fn members(&self) -> &[Identity] {
        &self.members
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Candidate is not a syntactically valid email address.
    InvalidAddress(String),
    /// Candidate is the local identity.
    SelfChat,
    /// A chat with the candidate already exists.
    DuplicateChat(ChatId),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(address) => write!(f, "Invalid email address: {address:?}"),
            Self::SelfChat => f.write_str("Cannot start a chat with yourself"),
            Self::DuplicateChat(id) => write!(f, "Chat already exists: {id}"),
        }
    }
}

impl std::error::Error for Rejection {}

/// Decides whether a chat between `me` and `candidate` should be created.
///
/// Checks run in order and stop at the first failure: address syntax,
/// self chat, then an existing chat with both members. The decision is
/// advisory; storage still enforces one chat per member pair.
pub fn should_create_chat<C>(
    existing: &[C],
    candidate: &str,
    me: &Identity,
) -> Result<NewChat, Rejection>
where
    C: Membership,
{
    let candidate: Identity = candidate
        .parse()
        .map_err(|_| Rejection::InvalidAddress(candidate.to_owned()))?;
    if candidate == *me {
        return Err(Rejection::SelfChat);
    }
    let id = ChatId::for_pair(me, &candidate);
    if existing
        .iter()
        .any(|chat| chat.has_member(candidate.as_str()) && chat.has_member(me.as_str()))
    {
        return Err(Rejection::DuplicateChat(id));
    }
    Ok(NewChat {
        id,
        members: [me.clone(), candidate],
    })
}
