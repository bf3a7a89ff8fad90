use std::collections::{HashMap, hash_map};
use std::fmt::Debug;
use std::str::FromStr;

use anyhow::anyhow;
use duet_core::{ChatId, Identity};
use serde::{Deserialize, Serialize};
use tokio_sqlite::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(pub chrono::DateTime<chrono::Utc>);

impl DateTime {
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    pub fn from_micros(micros: i64) -> Option<Self> {
        chrono::DateTime::<chrono::Utc>::from_timestamp_micros(micros).map(Self)
    }

    pub fn micros(&self) -> i64 {
        self.0.timestamp_micros()
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.micros())
    }
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let micros = i64::deserialize(deserializer)?;
        Self::from_micros(micros).ok_or(Error::custom("cannot deserialize DateTime from micros"))
    }
}

#[derive(Clone)]
pub struct ColumnIndex {
    column_map: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn builder() -> ColumnIndexBuilder {
        ColumnIndexBuilder {
            column_map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.column_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.column_map.is_empty()
    }

    pub fn get(&self, name: impl AsRef<str>) -> Option<usize> {
        self.column_map.get(name.as_ref()).cloned()
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![String::new(); self.column_map.len()];
        for (name, index) in self.column_map.iter() {
            columns[*index] = name.clone();
        }
        columns
    }

    pub fn without(&self, name: &str) -> ColumnIndex {
        let mut result = ColumnIndex::builder();
        for column in self.columns() {
            if column != name {
                result.add(column);
            }
        }
        result.build()
    }

    /// Quoted, comma-separated column list for SQL statements.
    pub fn format(&self) -> String {
        self.columns()
            .iter()
            .map(|column| format!("\"{column}\""))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Positional placeholders `?1, ?2, ...` matching the column list.
    pub fn placeholders(&self) -> String {
        (1..=self.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn get_value<'v>(&self, values: &'v [Value], name: impl AsRef<str>) -> Option<&'v Value> {
        assert_eq!(
            self.len(),
            values.len(),
            "Columns length differs from values length"
        );
        self.get(name).and_then(|index| values.get(index))
    }

    /// Like [`ColumnIndex::get_value`] but fails for an unknown column.
    pub fn value<'v>(&self, values: &'v [Value], name: &str) -> Result<&'v Value, anyhow::Error> {
        self.get_value(values, name)
            .ok_or_else(|| anyhow!("Unknown column: {name}"))
    }

    pub fn set_value(
        &self,
        values: &mut [Value],
        name: impl AsRef<str>,
        value: impl Into<Value>,
    ) -> bool {
        assert_eq!(
            self.len(),
            values.len(),
            "Columns length differs from values length"
        );
        match self.get(name) {
            Some(index) => values
                .get_mut(index)
                .map(|v| {
                    *v = value.into();
                    true
                })
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn new_values(&self) -> Vec<Value> {
        vec![Value::Null; self.len()]
    }
}

impl Debug for ColumnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ColumnIndex").field(&self.columns()).finish()
    }
}

pub struct ColumnIndexBuilder {
    column_map: HashMap<String, usize>,
}

impl ColumnIndexBuilder {
    pub fn add(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        let index = self.column_map.len();
        if let hash_map::Entry::Vacant(entry) = self.column_map.entry(name) {
            entry.insert(index);
        }
        self
    }

    pub fn build(&mut self) -> ColumnIndex {
        let column_map = std::mem::take(&mut self.column_map);
        ColumnIndex { column_map }
    }
}

pub(crate) fn value_as_i64(v: &Value) -> Result<i64, anyhow::Error> {
    match v {
        Value::Integer(i) => Ok(*i),
        _ => Err(anyhow!("Expected Integer for i64")),
    }
}

pub(crate) fn value_as_string(v: &Value) -> Result<String, anyhow::Error> {
    match v {
        Value::Text(s) => Ok(s.clone()),
        _ => Err(anyhow!("Expected Text for String")),
    }
}

pub(crate) fn value_as_string_opt(v: &Value) -> Result<Option<String>, anyhow::Error> {
    match v {
        Value::Null => Ok(None),
        v => value_as_string(v).map(Some),
    }
}

pub(crate) fn value_as_identity(v: &Value) -> Result<Identity, anyhow::Error> {
    match v {
        Value::Text(s) => Identity::from_str(s).map_err(|e| anyhow!("Invalid identity: {e}")),
        _ => Err(anyhow!("Expected Text for Identity")),
    }
}

pub(crate) fn value_as_chat_id(v: &Value) -> Result<ChatId, anyhow::Error> {
    match v {
        Value::Text(s) => ChatId::from_str(s).map_err(|e| anyhow!("Invalid chat id: {e}")),
        _ => Err(anyhow!("Expected Text for ChatId")),
    }
}

pub(crate) fn value_as_uuid(v: &Value) -> Result<Uuid, anyhow::Error> {
    match v {
        Value::Text(s) => Uuid::from_str(s).map_err(|e| anyhow!("Invalid Uuid: {e}")),
        _ => Err(anyhow!("Expected Text for Uuid")),
    }
}

pub(crate) fn value_as_datetime(v: &Value) -> Result<DateTime, anyhow::Error> {
    match v {
        Value::Integer(i) => {
            DateTime::from_micros(*i).ok_or(anyhow!("Cannot convert Integer to DateTime"))
        }
        _ => Err(anyhow!("Expected Integer for DateTime")),
    }
}
