use duet_core::{ChatId, Identity, Membership, NewChat, Recipient, resolve_recipient};
use lazy_static::lazy_static;
use tokio_sqlite::Value;

use super::{ColumnIndex, DateTime, value_as_chat_id, value_as_datetime, value_as_identity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    // Creator first, counterparty second.
    pub members: [Identity; 2],
    pub create_time: DateTime,
}

impl Chat {
    pub fn new(new_chat: NewChat, create_time: DateTime) -> Self {
        let (id, members) = new_chat.into_parts();
        Self {
            id,
            members,
            create_time,
        }
    }

    pub fn recipient(&self, me: Option<&Identity>) -> Recipient {
        resolve_recipient(&self.members, me)
    }

    pub fn columns() -> &'static ColumnIndex {
        lazy_static! {
            static ref COLUMNS: ColumnIndex = ColumnIndex::builder()
                .add("id")
                .add("member_a")
                .add("member_b")
                .add("create_time")
                .build();
        }
        &COLUMNS
    }

    pub fn values(&self, columns: &ColumnIndex) -> Vec<Value> {
        let mut values = columns.new_values();
        columns.set_value(&mut values, "id", self.id.to_string());
        columns.set_value(&mut values, "member_a", self.members[0].to_string());
        columns.set_value(&mut values, "member_b", self.members[1].to_string());
        columns.set_value(&mut values, "create_time", self.create_time.micros());
        values
    }

    pub fn from_values(values: Vec<Value>, columns: &ColumnIndex) -> Result<Self, anyhow::Error> {
        Ok(Self {
            id: value_as_chat_id(columns.value(&values, "id")?)?,
            members: [
                value_as_identity(columns.value(&values, "member_a")?)?,
                value_as_identity(columns.value(&values, "member_b")?)?,
            ],
            create_time: value_as_datetime(columns.value(&values, "create_time")?)?,
        })
    }
}

impl Membership for Chat {
    fn members(&self) -> &[Identity] {
        &self.members
    }
}
