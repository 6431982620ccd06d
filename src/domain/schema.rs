//! Column schema and the value model shared by every durable store.
//!
//! Entities describe their columns statically; rows travel between the
//! entity layer and the stores as [`Row`] maps of [`Value`]s. Conversion
//! between an entity and its row goes through serde so that each entity
//! only has to declare its schema.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Number, Value as Json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::error::DomainError;

/// Name of the primary key column shared by every table.
pub const ID_COLUMN: ColumnDef = ColumnDef::new("id", ColumnType::Int);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
    Timestamp,
}

/// Untyped column description used across the store seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

/// A column that belongs to entity `E`.
///
/// Filters are built from these handles, so a predicate against a column of
/// another entity type does not type-check.
pub struct Column<E> {
    def: ColumnDef,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Column<E> {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            def: ColumnDef::new(name, ty),
            _entity: PhantomData,
        }
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, ColumnType::Int)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnType::Bool)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, ColumnType::Timestamp)
    }

    pub const fn def(&self) -> ColumnDef {
        self.def
    }

    pub const fn name(&self) -> &'static str {
        self.def.name
    }
}

impl<E> Clone for Column<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Column<E> {}

impl<E> fmt::Debug for Column<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Column").field(&self.def).finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(OffsetDateTime),
}

impl Value {
    /// Coerce raw text (query strings, configuration) into a value of `ty`.
    pub fn parse(ty: ColumnType, raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        match ty {
            ColumnType::Int => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|err| format!("`{trimmed}` is not an integer: {err}")),
            ColumnType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|err| format!("`{trimmed}` is not a number: {err}")),
            ColumnType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(format!("`{trimmed}` is not a boolean")),
            },
            ColumnType::Text => Ok(Value::Text(raw.to_string())),
            ColumnType::Timestamp => OffsetDateTime::parse(trimmed, &Rfc3339)
                .map(Value::Timestamp)
                .map_err(|err| format!("`{trimmed}` is not an RFC 3339 timestamp: {err}")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Compare two values the way SQL would; `None` when either side is
    /// `NULL` or the types are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Render as plain text, as a `CAST(... AS TEXT)` would.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(value) => Some(value.to_string()),
            Value::Int(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            Value::Text(value) => Some(value.clone()),
            Value::Timestamp(value) => value.format(&Rfc3339).ok(),
        }
    }

    fn from_json(column: &ColumnDef, json: &Json) -> Result<Self, DomainError> {
        if json.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = || DomainError::column(column.name, format!("unexpected value `{json}`"));
        match column.ty {
            ColumnType::Int => json.as_i64().map(Value::Int).ok_or_else(mismatch),
            ColumnType::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
            ColumnType::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            ColumnType::Text => json
                .as_str()
                .map(|value| Value::Text(value.to_string()))
                .ok_or_else(mismatch),
            ColumnType::Timestamp => {
                let raw = json.as_str().ok_or_else(mismatch)?;
                OffsetDateTime::parse(raw, &Rfc3339)
                    .map(Value::Timestamp)
                    .map_err(|err| DomainError::column(column.name, err.to_string()))
            }
        }
    }

    fn into_json(self, column: &ColumnDef) -> Result<Json, DomainError> {
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(value) => Json::Bool(value),
            Value::Int(value) => Json::Number(value.into()),
            Value::Float(value) => Number::from_f64(value)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(value) => Json::String(value),
            Value::Timestamp(value) => Json::String(
                value
                    .format(&Rfc3339)
                    .map_err(|err| DomainError::column(column.name, err.to_string()))?,
            ),
        })
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// One stored record: column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn id(&self) -> Option<i64> {
        self.get(ID_COLUMN.name).as_i64()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Keep only the listed columns, filling absent ones with `NULL`.
    pub fn project(&self, columns: &[ColumnDef]) -> Row {
        let mut projected = Row::new();
        for column in columns {
            projected.set(column.name, self.get(column.name).clone());
        }
        projected
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Current UTC time at the microsecond precision of `timestamptz`, so a
/// stamped entity compares equal to the row read back from storage.
pub fn timestamp_now() -> OffsetDateTime {
    truncate_to_micros(OffsetDateTime::now_utc())
}

fn truncate_to_micros(at: OffsetDateTime) -> OffsetDateTime {
    at - time::Duration::nanoseconds(i64::from(at.nanosecond() % 1_000))
}

/// A persistent record type with a static schema.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Storage partition (table) name; also the cache key namespace.
    const TABLE: &'static str;
    /// Whether point lookups of this type may be served from the cache.
    const CACHEABLE: bool;
    /// Every persisted column, `id` included.
    const COLUMNS: &'static [ColumnDef];

    /// `None` until the entity has been inserted.
    fn id(&self) -> Option<i64>;

    fn assign_id(&mut self, id: i64);

    /// Record a mutation at `now`.
    fn touch(&mut self, now: OffsetDateTime);

    fn column(name: &str) -> Option<ColumnDef> {
        Self::COLUMNS
            .iter()
            .find(|column| column.name == name)
            .copied()
    }

    fn to_row(&self) -> Result<Row, DomainError> {
        let json = serde_json::to_value(self)
            .map_err(|err| DomainError::row(Self::TABLE, err.to_string()))?;
        let Json::Object(object) = json else {
            return Err(DomainError::row(
                Self::TABLE,
                "entity did not serialize to an object",
            ));
        };

        let mut row = Row::new();
        for column in Self::COLUMNS {
            let value = match object.get(column.name) {
                Some(json) => Value::from_json(column, json)?,
                None => Value::Null,
            };
            row.set(column.name, value);
        }
        Ok(row)
    }

    fn from_row(row: Row) -> Result<Self, DomainError> {
        let mut object = Map::new();
        for column in Self::COLUMNS {
            let value = row.get(column.name).clone().into_json(column)?;
            object.insert(column.name.to_string(), value);
        }
        serde_json::from_value(Json::Object(object))
            .map_err(|err| DomainError::row(Self::TABLE, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn timestamps_are_truncated_to_microseconds() {
        let at = datetime!(2024-05-01 12:00:00.123456789 UTC);
        assert_eq!(
            truncate_to_micros(at),
            datetime!(2024-05-01 12:00:00.123456 UTC)
        );
        assert_eq!(timestamp_now().nanosecond() % 1_000, 0);
    }

    #[test]
    fn parse_coerces_to_column_type() {
        assert_eq!(Value::parse(ColumnType::Int, " 42 "), Ok(Value::Int(42)));
        assert_eq!(Value::parse(ColumnType::Bool, "TRUE"), Ok(Value::Bool(true)));
        assert_eq!(
            Value::parse(ColumnType::Text, "keep spaces "),
            Ok(Value::Text("keep spaces ".to_string()))
        );
        assert!(Value::parse(ColumnType::Int, "abc").is_err());
        assert!(Value::parse(ColumnType::Timestamp, "2024-02-30").is_err());
    }

    #[test]
    fn compare_treats_null_as_incomparable() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(
            Value::Int(2).compare(&Value::Float(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Text("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn project_fills_missing_columns_with_null() {
        let mut row = Row::new();
        row.set("id", 7_i64);
        let projected = row.project(&[ID_COLUMN, ColumnDef::new("name", ColumnType::Text)]);
        assert_eq!(projected.id(), Some(7));
        assert!(projected.get("name").is_null());
        assert_eq!(projected.len(), 2);
    }
}
