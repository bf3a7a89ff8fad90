use serde::{Deserialize, Serialize};

/// Email address that identifies a chat participant.
///
/// Values are validated on construction and compared byte-exactly.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub const MAX_LEN: usize = 254;
    const MAX_LOCAL_LEN: usize = 64;
    const MAX_DOMAIN_LEN: usize = 255;
    const MAX_LABEL_LEN: usize = 63;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether `s` is a syntactically valid email address.
    pub fn is_valid(s: &str) -> bool {
        Self::validate(s).is_ok()
    }

    fn validate(s: &str) -> Result<(), IdentityError> {
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(IdentityError::TooLong(s.len()));
        }
        let (local, domain) = s.rsplit_once('@').ok_or(IdentityError::MissingAt)?;
        Self::validate_local(local)?;
        Self::validate_domain(domain)?;
        Ok(())
    }

    fn validate_local(local: &str) -> Result<(), IdentityError> {
        if local.is_empty() || local.len() > Self::MAX_LOCAL_LEN {
            return Err(IdentityError::InvalidLocalPart);
        }
        if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
            return Err(IdentityError::InvalidLocalPart);
        }
        if !local.bytes().all(|c| c == b'.' || Self::is_atext(c)) {
            return Err(IdentityError::InvalidLocalPart);
        }
        Ok(())
    }

    fn validate_domain(domain: &str) -> Result<(), IdentityError> {
        if domain.is_empty() || domain.len() > Self::MAX_DOMAIN_LEN {
            return Err(IdentityError::InvalidDomain);
        }
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 {
            return Err(IdentityError::InvalidDomain);
        }
        for label in &labels {
            if label.is_empty() || label.len() > Self::MAX_LABEL_LEN {
                return Err(IdentityError::InvalidDomain);
            }
            if label.starts_with('-') || label.ends_with('-') {
                return Err(IdentityError::InvalidDomain);
            }
            if !label.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-') {
                return Err(IdentityError::InvalidDomain);
            }
        }
        // Top-level label: at least two characters, starting with a letter.
        let tld = labels[labels.len() - 1];
        if tld.len() < 2 || !tld.as_bytes()[0].is_ascii_alphabetic() {
            return Err(IdentityError::InvalidDomain);
        }
        Ok(())
    }

    // RFC 5322 atext.
    fn is_atext(c: u8) -> bool {
        c.is_ascii_alphanumeric() || b"!#$%&'*+-/=?^_`{|}~".contains(&c)
    }
}

impl std::str::FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identity {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityError {
    Empty,
    TooLong(usize),
    MissingAt,
    InvalidLocalPart,
    InvalidDomain,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty address"),
            Self::TooLong(len) => write!(f, "Address is too long: {len} bytes"),
            Self::MissingAt => f.write_str("Address has no '@'"),
            Self::InvalidLocalPart => f.write_str("Invalid local part"),
            Self::InvalidDomain => f.write_str("Invalid domain"),
        }
    }
}

impl std::error::Error for IdentityError {}
