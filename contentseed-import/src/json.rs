//! JSON content reader, in plain and ordered flavours.
//!
//! A document is one object describing one node. Nested objects become child
//! nodes, scalars and arrays of scalars become properties. The ordered
//! flavour additionally reads an explicit child list:
//!
//! ```json
//! { "SLING:ordered": [ { "SLING:name": "first" }, { "SLING:name": "second" } ] }
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use contentseed_types::{
    AccessControlEntry, AceOrder, PrincipalDefinition, PropertyType, PropertyValue,
    RestrictionValue, Value,
};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::io::Read;

use crate::{ContentCreator, ContentReader, ImportError, ImportResult};

pub const PRIMARY_TYPE_KEY: &str = "jcr:primaryType";
pub const MIXIN_TYPES_KEY: &str = "jcr:mixinTypes";
pub const PRINCIPALS_KEY: &str = "security:principals";
pub const ACL_KEY: &str = "security:acl";
pub const ORDERED_CHILDREN_KEY: &str = "SLING:ordered";
pub const ORDERED_CHILD_NAME_KEY: &str = "SLING:name";

/// Properties maintained by the store itself; declarations are dropped.
const PROTECTED_KEYS: &[&str] = &[
    "jcr:uuid",
    "jcr:baseVersion",
    "jcr:predecessors",
    "jcr:successors",
    "jcr:checkedOut",
    "jcr:created",
];

const REFERENCE_PREFIX: &str = "jcr:reference:";
const PATH_PREFIX: &str = "jcr:path:";
const NAME_PREFIX: &str = "jcr:name:";
const BINARY_PREFIX: char = ':';

/// Reads `.json` documents, or `.ordered-json` documents when ordered.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReader {
    ordered: bool,
}

impl JsonReader {
    pub fn new() -> Self {
        Self { ordered: false }
    }

    /// A reader that honours `SLING:ordered` child lists.
    pub fn ordered() -> Self {
        Self { ordered: true }
    }

    fn write_node(
        &self,
        name: Option<&str>,
        obj: &Map<String, Json>,
        creator: &mut dyn ContentCreator,
    ) -> ImportResult<()> {
        let primary_type = match obj.get(PRIMARY_TYPE_KEY) {
            Some(Json::String(t)) => Some(t.as_str()),
            Some(other) => return Err(ImportError::decode(format!("{PRIMARY_TYPE_KEY} must be a string, got {other}"))),
            None => None,
        };
        let mixins = match obj.get(MIXIN_TYPES_KEY) {
            Some(value) => string_list(MIXIN_TYPES_KEY, value)?,
            None => Vec::new(),
        };

        creator.create_node(name, primary_type, &mixins)?;
        self.write_content(obj, creator)?;
        creator.finish_node()
    }

    fn write_content(&self, obj: &Map<String, Json>, creator: &mut dyn ContentCreator) -> ImportResult<()> {
        for (key, value) in obj {
            match key.as_str() {
                PRIMARY_TYPE_KEY | MIXIN_TYPES_KEY => {}
                k if PROTECTED_KEYS.contains(&k) => {}
                PRINCIPALS_KEY => {
                    for principal in one_or_many(value) {
                        creator.create_principal(parse_principal(principal)?)?;
                    }
                }
                ACL_KEY => {
                    for ace in one_or_many(value) {
                        creator.create_ace(parse_ace(ace)?)?;
                    }
                }
                ORDERED_CHILD_NAME_KEY if self.ordered => {}
                ORDERED_CHILDREN_KEY if self.ordered => self.write_ordered(value, creator)?,
                _ => match value {
                    Json::Object(child) => self.write_node(Some(key), child, creator)?,
                    _ => {
                        if let Some((name, property)) = parse_property(key, value)? {
                            creator.create_property(name, property)?;
                        }
                    }
                },
            }
        }
        Ok(())
    }

    fn write_ordered(&self, value: &Json, creator: &mut dyn ContentCreator) -> ImportResult<()> {
        let Json::Array(children) = value else {
            return Err(ImportError::decode(format!("{ORDERED_CHILDREN_KEY} must be an array")));
        };
        for child in children {
            let Json::Object(obj) = child else {
                return Err(ImportError::decode(format!(
                    "{ORDERED_CHILDREN_KEY} elements must be objects"
                )));
            };
            let Some(Json::String(name)) = obj.get(ORDERED_CHILD_NAME_KEY) else {
                return Err(ImportError::decode(format!(
                    "{ORDERED_CHILDREN_KEY} element without a {ORDERED_CHILD_NAME_KEY} string"
                )));
            };
            self.write_node(Some(name), obj, creator)?;
        }
        Ok(())
    }
}

impl ContentReader for JsonReader {
    fn name(&self) -> &str {
        if self.ordered { "ordered-json" } else { "json" }
    }

    fn extensions(&self) -> &[&'static str] {
        if self.ordered { &["ordered-json"] } else { &["json"] }
    }

    fn content_types(&self) -> &[&'static str] {
        // The ordered flavour shares the MIME type; the plain reader owns it.
        if self.ordered { &[] } else { &["application/json"] }
    }

    fn parse(&self, input: &mut dyn Read, creator: &mut dyn ContentCreator) -> ImportResult<()> {
        let document: Json = serde_json::from_reader(input)?;
        let Json::Object(root) = document else {
            return Err(ImportError::decode("top-level JSON value must be an object"));
        };
        self.write_node(None, &root, creator)
    }
}

// ── Properties ───────────────────────────────────────────────────

/// Converts one JSON member into a typed property. `null` yields `None`.
fn parse_property<'k>(key: &'k str, value: &Json) -> ImportResult<Option<(&'k str, PropertyValue)>> {
    let (name, forced) = property_name(key);
    if name.is_empty() {
        return Err(ImportError::decode(format!("empty property name in {key:?}")));
    }
    let property = match value {
        Json::Null => return Ok(None),
        Json::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Json::Null => {}
                    Json::Array(_) | Json::Object(_) => {
                        return Err(ImportError::decode(format!(
                            "property {name:?} has a nested value inside an array"
                        )));
                    }
                    scalar => values.push(scalar_value(name, scalar, forced)?),
                }
            }
            uniform_multi(values, forced)
        }
        scalar => PropertyValue::Single(scalar_value(name, scalar, forced)?),
    };
    Ok(Some((name, property)))
}

/// Splits a type-forcing prefix off a property key.
fn property_name(key: &str) -> (&str, Option<PropertyType>) {
    if let Some(name) = key.strip_prefix(REFERENCE_PREFIX) {
        (name, Some(PropertyType::Reference))
    } else if let Some(name) = key.strip_prefix(PATH_PREFIX) {
        (name, Some(PropertyType::Path))
    } else if let Some(name) = key.strip_prefix(NAME_PREFIX) {
        (name, Some(PropertyType::Name))
    } else if let Some(name) = key.strip_prefix(BINARY_PREFIX) {
        (name, Some(PropertyType::Binary))
    } else {
        (key, None)
    }
}

fn scalar_value(name: &str, value: &Json, forced: Option<PropertyType>) -> ImportResult<Value> {
    if let Some(forced) = forced {
        let Json::String(s) = value else {
            return Err(ImportError::decode(format!("property {name:?} of type {forced} must be a string")));
        };
        return Ok(match forced {
            PropertyType::Reference => Value::Reference(s.clone()),
            PropertyType::Path => Value::Path(s.clone()),
            PropertyType::Name => Value::Name(s.clone()),
            _ => Value::Binary(
                BASE64
                    .decode(s)
                    .map_err(|e| ImportError::decode(format!("property {name:?}: {e}")))?,
            ),
        });
    }
    Ok(match value {
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Long(i),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(date) => Value::Date(date),
            Err(_) => Value::String(s.clone()),
        },
        other => return Err(ImportError::decode(format!("property {name:?} is not a scalar: {other}"))),
    })
}

/// Builds a multi-valued property. Mixed inferred types fall back to strings.
fn uniform_multi(values: Vec<Value>, forced: Option<PropertyType>) -> PropertyValue {
    if values.is_empty() {
        return PropertyValue::Multi {
            value_type: forced.unwrap_or(PropertyType::String),
            values,
        };
    }
    let first = values[0].property_type();
    if values.iter().all(|v| v.property_type() == first) {
        return PropertyValue::multi(values);
    }
    PropertyValue::strings(values.iter().map(display_value))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) | Value::Name(s) | Value::Path(s) | Value::Reference(s) => s.clone(),
        Value::Long(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Date(d) => d.to_rfc3339(),
        Value::Binary(b) => BASE64.encode(b),
    }
}

// ── Security ─────────────────────────────────────────────────────

fn one_or_many(value: &Json) -> Vec<&Json> {
    match value {
        Json::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn string_list(key: &str, value: &Json) -> ImportResult<Vec<String>> {
    match value {
        Json::String(s) => Ok(vec![s.clone()]),
        Json::Array(items) => items
            .iter()
            .map(|item| match item {
                Json::String(s) => Ok(s.clone()),
                other => Err(ImportError::decode(format!("{key} entries must be strings, got {other}"))),
            })
            .collect(),
        other => Err(ImportError::decode(format!("{key} must be a string or list, got {other}"))),
    }
}

fn required_str<'a>(obj: &'a Map<String, Json>, key: &str, what: &str) -> ImportResult<&'a str> {
    match obj.get(key) {
        Some(Json::String(s)) if !s.is_empty() => Ok(s),
        _ => Err(ImportError::decode(format!("{what} requires a {key:?} string"))),
    }
}

fn parse_principal(value: &Json) -> ImportResult<PrincipalDefinition> {
    let Json::Object(obj) = value else {
        return Err(ImportError::decode(format!("{PRINCIPALS_KEY} entries must be objects")));
    };
    let name = required_str(obj, "name", "principal")?;
    let is_group = matches!(obj.get("isgroup"), Some(Json::Bool(true)));

    let mut principal = if is_group {
        let members = match obj.get("members") {
            Some(value) => string_list("members", value)?,
            None => Vec::new(),
        };
        PrincipalDefinition::group(name, members)
    } else {
        let password = obj.get("password").and_then(Json::as_str).map(str::to_string);
        PrincipalDefinition::user(name, password)
    };

    for (key, value) in obj {
        if matches!(key.as_str(), "name" | "isgroup" | "members" | "password") {
            continue;
        }
        if let Some((name, property)) = parse_property(key, value)? {
            principal.properties.insert(name.to_string(), property);
        }
    }
    Ok(principal)
}

fn parse_ace(value: &Json) -> ImportResult<AccessControlEntry> {
    let Json::Object(obj) = value else {
        return Err(ImportError::decode(format!("{ACL_KEY} entries must be objects")));
    };
    let mut ace = AccessControlEntry::new(required_str(obj, "principal", "access control entry")?);
    if let Some(granted) = obj.get("granted") {
        ace.granted = string_list("granted", granted)?;
    }
    if let Some(denied) = obj.get("denied") {
        ace.denied = string_list("denied", denied)?;
    }
    if let Some(order) = obj.get("order") {
        let raw = order.as_str().unwrap_or_default();
        ace.order = Some(
            AceOrder::parse(raw)
                .ok_or_else(|| ImportError::decode(format!("invalid ACE order {order}")))?,
        );
    }
    if let Some(restrictions) = obj.get("restrictions") {
        let Json::Object(restrictions) = restrictions else {
            return Err(ImportError::decode("ACE restrictions must be an object"));
        };
        ace.restrictions = restrictions
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Json::String(s) => RestrictionValue::Single(s.clone()),
                    other => RestrictionValue::Multi(string_list(name, other)?),
                };
                Ok((name.clone(), value))
            })
            .collect::<ImportResult<BTreeMap<_, _>>>()?;
    }
    Ok(ace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_force_types() {
        assert_eq!(property_name("jcr:reference:target"), ("target", Some(PropertyType::Reference)));
        assert_eq!(property_name("jcr:path:link"), ("link", Some(PropertyType::Path)));
        assert_eq!(property_name(":blob"), ("blob", Some(PropertyType::Binary)));
        assert_eq!(property_name("jcr:title"), ("jcr:title", None));
    }

    #[test]
    fn mixed_arrays_become_strings() {
        let value = uniform_multi(vec![Value::Long(1), Value::String("a".into())], None);
        assert_eq!(value, PropertyValue::strings(["1", "a"]));
    }

    #[test]
    fn null_is_skipped() {
        assert!(parse_property("x", &Json::Null).unwrap().is_none());
    }
}
