use duet_core::Identity;
use lazy_static::lazy_static;
use tokio_sqlite::Value;

use super::{ColumnIndex, DateTime, value_as_datetime, value_as_identity, value_as_string_opt};

/// Last activity of a participant. Only the owning identity writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub identity: Identity,
    pub photo_url: Option<String>,
    pub last_seen: DateTime,
}

impl Presence {
    pub fn columns() -> &'static ColumnIndex {
        lazy_static! {
            static ref COLUMNS: ColumnIndex = ColumnIndex::builder()
                .add("identity")
                .add("photo_url")
                .add("last_seen")
                .build();
        }
        &COLUMNS
    }

    pub fn values(&self, columns: &ColumnIndex) -> Vec<Value> {
        let mut values = columns.new_values();
        columns.set_value(&mut values, "identity", self.identity.to_string());
        columns.set_value(&mut values, "photo_url", self.photo_url.clone());
        columns.set_value(&mut values, "last_seen", self.last_seen.micros());
        values
    }

    pub fn from_values(values: Vec<Value>, columns: &ColumnIndex) -> Result<Self, anyhow::Error> {
        Ok(Self {
            identity: value_as_identity(columns.value(&values, "identity")?)?,
            photo_url: value_as_string_opt(columns.value(&values, "photo_url")?)?,
            last_seen: value_as_datetime(columns.value(&values, "last_seen")?)?,
        })
    }
}

/// Displayable "last active" state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastSeen {
    /// The participant never signed in or sent anything.
    Never,
    At(DateTime),
}

impl From<Option<&Presence>> for LastSeen {
    fn from(presence: Option<&Presence>) -> Self {
        match presence {
            Some(presence) => Self::At(presence.last_seen),
            None => Self::Never,
        }
    }
}

impl std::fmt::Display for LastSeen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => f.write_str("Unavailable"),
            Self::At(time) => write!(f, "{time}"),
        }
    }
}
