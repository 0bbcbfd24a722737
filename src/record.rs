//! Records and the values they hold

use crate::DynTableError;
use anyhow::Result;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as SerdeValue};
use std::fmt;

/// The textual form used for dates, both when embedding them in a predicate and when storing them.
pub static DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single field value. Note that variant order matters for deserialization: a JSON string is
/// always read as a [Value::String], never as a [Value::Date].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDateTime),
    Record(Record),
}

impl Value {
    /// Render this value the way it is embedded in a predicate that is sent to the store: strings
    /// and dates are single-quoted (with embedded single quotes doubled), everything else uses its
    /// default textual form. NaN and the infinities have no SQL literal and render as `NULL`.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) if !f.is_finite() => "NULL".to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => quote(s),
            Value::Date(d) => quote(&d.format(DATE_FORMAT).to_string()),
            Value::Record(r) => quote(&r.to_json().to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Converts the given [SerdeValue] into a [Value]. Arrays have no counterpart and are kept as
    /// their JSON text.
    pub fn from_json(value: &SerdeValue) -> Self {
        match value {
            SerdeValue::Null => Value::Null,
            SerdeValue::Bool(b) => Value::Bool(*b),
            SerdeValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            SerdeValue::String(s) => Value::String(s.to_string()),
            SerdeValue::Array(_) => Value::String(value.to_string()),
            SerdeValue::Object(map) => Value::Record(Record::from_json(map)),
        }
    }

    pub fn to_json(&self) -> SerdeValue {
        match self {
            Value::Null => SerdeValue::Null,
            Value::Bool(b) => json!(b),
            Value::Integer(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::String(s) => json!(s),
            Value::Date(d) => json!(d.format(DATE_FORMAT).to_string()),
            Value::Record(r) => r.to_json(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            _ => write!(f, "{}", self.to_json()),
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// An ordered mapping from field names to [Value]s. Field names are unique; lookups through
/// [Record::get] are exact while [Record::get_ignore_case] matches the way SQL identifiers do.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Given a JSON object in the following format:
    /// ```json
    /// {
    ///     "column_1": value1,
    ///     "column_2": value2,
    ///     ...
    /// }
    /// ```
    /// convert it into a [Record], preserving the order of its fields.
    pub fn from_json(map: &serde_json::Map<String, SerdeValue>) -> Self {
        map.iter()
            .map(|(field, value)| (field.to_string(), Value::from_json(value)))
            .collect()
    }

    /// Like [Record::from_json] but accepts any [SerdeValue], failing when it is not an object.
    pub fn try_from_json(value: &SerdeValue) -> Result<Self> {
        match value.as_object() {
            Some(map) => Ok(Self::from_json(map)),
            None => Err(DynTableError::InputError(format!(
                "Could not convert {} to a record",
                value
            ))
            .into()),
        }
    }

    pub fn to_json(&self) -> SerdeValue {
        SerdeValue::Object(
            self.fields
                .iter()
                .map(|(field, value)| (field.to_string(), value.to_json()))
                .collect(),
        )
    }

    /// Builder-style insert, handy for constructing records inline.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Sets the given field, returning the previous value if there was one. A replaced field keeps
    /// its original position.
    pub fn insert(&mut self, field: &str, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.to_string(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Returns the name under which `field` is stored in this record, comparing names
    /// case-insensitively.
    pub fn field_name_ignore_case(&self, field: &str) -> Option<&str> {
        self.fields
            .keys()
            .find(|key| key.eq_ignore_ascii_case(field))
            .map(|key| key.as_str())
    }

    pub fn get_ignore_case(&self, field: &str) -> Option<&Value> {
        self.field_name_ignore_case(field)
            .and_then(|key| self.fields.get(key))
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(|v| v.as_f64())
    }

    pub fn get_date(&self, field: &str) -> Option<&NaiveDateTime> {
        self.get(field).and_then(|v| v.as_date())
    }

    pub fn get_record(&self, field: &str) -> Option<&Record> {
        self.get(field).and_then(|v| v.as_record())
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn contains_key_ignore_case(&self, field: &str) -> bool {
        self.field_name_ignore_case(field).is_some()
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, String, Value> {
        self.fields.iter_mut()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
