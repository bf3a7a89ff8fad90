use duet_core::{ChatId, Rejection};

/// Errors reported to the caller of a [`Session`](crate::session::Session)
/// or manager operation.
#[derive(Debug)]
pub enum ClientError {
    /// Chat creation was refused; the user can correct the input.
    Rejected(Rejection),
    /// Message text is empty.
    EmptyMessage,
    ChatNotFound(ChatId),
    /// The signed-in identity is not one of the two members of the chat.
    NotMember(ChatId),
    /// The store failed or did not answer in time.
    StorageUnavailable(anyhow::Error),
    /// No identity is signed in.
    AuthUnavailable,
}

impl ClientError {
    pub(crate) fn storage(err: impl Into<anyhow::Error>) -> Self {
        Self::StorageUnavailable(err.into())
    }

    /// Whether repeating the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::AuthUnavailable)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(rejection) => write!(f, "{rejection}"),
            Self::EmptyMessage => f.write_str("Message is empty"),
            Self::ChatNotFound(id) => write!(f, "Chat not found: {id}"),
            Self::NotMember(id) => write!(f, "Not a member of chat {id}"),
            Self::StorageUnavailable(err) => write!(f, "Storage unavailable: {err:#}"),
            Self::AuthUnavailable => f.write_str("Not signed in"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::StorageUnavailable(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<Rejection> for ClientError {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}
