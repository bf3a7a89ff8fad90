use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::Identity;

/// Chat identifier derived from the unordered member pair.
///
/// Two chats with the same members in any order always get the same
/// identifier, which lets storage enforce one chat per pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChatId([u8; Self::LEN]);

impl ChatId {
    pub const LEN: usize = 32;

    pub fn for_pair(a: &Identity, b: &Identity) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = Sha256::new();
        hasher.update(first.as_str().as_bytes());
        // Not allowed in an address, so the encoding is unambiguous.
        hasher.update([0u8]);
        hasher.update(second.as_str().as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(hash.as_slice());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.as_bytes()))
    }
}

impl std::fmt::Debug for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::str::FromStr for ChatId {
    type Err = ChatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| ChatIdError::InvalidEncoding)?;
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| ChatIdError::InvalidLength(v.len()))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl TryFrom<String> for ChatId {
    type Error = ChatIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChatId> for String {
    fn from(id: ChatId) -> Self {
        id.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatIdError {
    InvalidEncoding,
    InvalidLength(usize),
}

impl std::fmt::Display for ChatIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEncoding => f.write_str("Invalid chat id encoding"),
            Self::InvalidLength(len) => write!(f, "Invalid chat id length: {len}"),
        }
    }
}

impl std::error::Error for ChatIdError {}
