//! Property values.
//!
//! A property is either single-valued or multi-valued. The cardinality is
//! part of the declared value and is carried through unchanged into the
//! store; it is never inferred from what the store already holds.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Binary,
    Long,
    Double,
    Boolean,
    Date,
    Name,
    Path,
    Reference,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "String",
            Self::Binary => "Binary",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::Name => "Name",
            Self::Path => "Path",
            Self::Reference => "Reference",
        };
        f.write_str(s)
    }
}

/// A single typed scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Binary(Vec<u8>),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<FixedOffset>),
    Name(String),
    Path(String),
    Reference(String),
}

impl Value {
    /// Returns the property type of this scalar.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Binary(_) => PropertyType::Binary,
            Self::Long(_) => PropertyType::Long,
            Self::Double(_) => PropertyType::Double,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Date(_) => PropertyType::Date,
            Self::Name(_) => PropertyType::Name,
            Self::Path(_) => PropertyType::Path,
            Self::Reference(_) => PropertyType::Reference,
        }
    }

    /// Returns the string payload for textual types.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Name(s) | Self::Path(s) | Self::Reference(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

/// A property value as declared by a reader: one scalar, or an ordered list
/// of scalars sharing one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyValue {
    Single(Value),
    Multi {
        value_type: PropertyType,
        values: Vec<Value>,
    },
}

impl PropertyValue {
    /// Builds a multi-valued property. The type is taken from the first
    /// value; an empty list is typed as `String`.
    pub fn multi(values: Vec<Value>) -> Self {
        let value_type = values
            .first()
            .map_or(PropertyType::String, Value::property_type);
        Self::Multi { value_type, values }
    }

    /// Builds a multi-valued string property.
    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multi {
            value_type: PropertyType::String,
            values: values.into_iter().map(|s| Value::String(s.into())).collect(),
        }
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multi { .. })
    }

    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Single(v) => v.property_type(),
            Self::Multi { value_type, .. } => *value_type,
        }
    }

    /// Returns the scalar of a single-valued property.
    pub fn single(&self) -> Option<&Value> {
        match self {
            Self::Single(v) => Some(v),
            Self::Multi { .. } => None,
        }
    }

    /// Returns all scalars; a single value yields a one-element slice.
    pub fn values(&self) -> &[Value] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Multi { values, .. } => values,
        }
    }

    /// Unions `other` into this multi-valued property, keeping the existing
    /// values first and skipping duplicates. Single values are replaced.
    pub fn merged_with(&self, other: &PropertyValue) -> PropertyValue {
        match (self, other) {
            (Self::Multi { values: existing, .. }, Self::Multi { value_type, values }) => {
                let mut merged = existing.clone();
                for v in values {
                    if !merged.contains(v) {
                        merged.push(v.clone());
                    }
                }
                Self::Multi {
                    value_type: *value_type,
                    values: merged,
                }
            }
            _ => other.clone(),
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(v: Value) -> Self {
        Self::Single(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Single(Value::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_multi_is_string_typed() {
        let v = PropertyValue::multi(Vec::new());
        assert!(v.is_multiple());
        assert_eq!(v.property_type(), PropertyType::String);
        assert!(v.values().is_empty());
    }

    #[test]
    fn merge_keeps_existing_first_and_dedups() {
        let existing = PropertyValue::strings(["a", "b"]);
        let incoming = PropertyValue::strings(["b", "c"]);
        assert_eq!(existing.merged_with(&incoming), PropertyValue::strings(["a", "b", "c"]));
    }

    #[test]
    fn merge_replaces_single_values() {
        let existing = PropertyValue::from("old");
        let incoming = PropertyValue::from("new");
        assert_eq!(existing.merged_with(&incoming), incoming);
    }
}
