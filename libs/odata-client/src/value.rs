//! Literal values and entity keys.
//!
//! `Value` is what a predicate compares against. The grammar decides how each
//! value is quoted; `Display` only gives the natural (unquoted) form.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    String(String),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Uuid(u) => write!(f, "{}", u.hyphenated()),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

/// Trait for types that can be used as predicate operands.
pub trait IntoODataValue {
    /// Convert this value into an `OData` literal value.
    fn into_odata_value(self) -> Value;
}

impl IntoODataValue for Value {
    fn into_odata_value(self) -> Value {
        self
    }
}

impl IntoODataValue for bool {
    fn into_odata_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoODataValue for String {
    fn into_odata_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoODataValue for &str {
    fn into_odata_value(self) -> Value {
        Value::String(self.to_owned())
    }
}

impl IntoODataValue for &String {
    fn into_odata_value(self) -> Value {
        Value::String(self.clone())
    }
}

impl IntoODataValue for i32 {
    fn into_odata_value(self) -> Value {
        Value::Int(self.into())
    }
}

impl IntoODataValue for i64 {
    fn into_odata_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoODataValue for u32 {
    fn into_odata_value(self) -> Value {
        Value::Int(self.into())
    }
}

impl IntoODataValue for u64 {
    fn into_odata_value(self) -> Value {
        i64::try_from(self).map_or_else(|_| Value::Decimal(self.into()), Value::Int)
    }
}

impl IntoODataValue for f64 {
    fn into_odata_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoODataValue for BigDecimal {
    fn into_odata_value(self) -> Value {
        Value::Decimal(self)
    }
}

impl IntoODataValue for Uuid {
    fn into_odata_value(self) -> Value {
        Value::Uuid(self)
    }
}

impl IntoODataValue for DateTime<Utc> {
    fn into_odata_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl IntoODataValue for NaiveDate {
    fn into_odata_value(self) -> Value {
        Value::Date(self)
    }
}

impl<T: IntoODataValue> IntoODataValue for Option<T> {
    fn into_odata_value(self) -> Value {
        self.map_or(Value::Null, IntoODataValue::into_odata_value)
    }
}

/// Key selecting a single entity within an entity set.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityKey {
    Int(i64),
    Uuid(Uuid),
    String(String),
    /// Multi-part key, rendered as `k1=v1,k2=v2` in declaration order.
    Composite(Vec<(String, Value)>),
}

impl From<i64> for EntityKey {
    fn from(id: i64) -> Self {
        EntityKey::Int(id)
    }
}

impl From<i32> for EntityKey {
    fn from(id: i32) -> Self {
        EntityKey::Int(id.into())
    }
}

impl From<u32> for EntityKey {
    fn from(id: u32) -> Self {
        EntityKey::Int(id.into())
    }
}

impl From<Uuid> for EntityKey {
    fn from(id: Uuid) -> Self {
        EntityKey::Uuid(id)
    }
}

impl From<&str> for EntityKey {
    fn from(id: &str) -> Self {
        EntityKey::String(id.to_owned())
    }
}

impl From<String> for EntityKey {
    fn from(id: String) -> Self {
        EntityKey::String(id)
    }
}

impl<K, V> From<Vec<(K, V)>> for EntityKey
where
    K: Into<String>,
    V: IntoODataValue,
{
    fn from(parts: Vec<(K, V)>) -> Self {
        EntityKey::Composite(
            parts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into_odata_value()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for EntityKey
where
    K: Into<String>,
    V: IntoODataValue,
{
    fn from(parts: [(K, V); N]) -> Self {
        EntityKey::Composite(
            parts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into_odata_value()))
                .collect(),
        )
    }
}
