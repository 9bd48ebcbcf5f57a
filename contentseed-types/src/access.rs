//! Access-control and principal declarations.
//!
//! These are produced by readers from reserved keys and consumed by the tree
//! builder, which hands them to the store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::PropertyValue;

/// A restriction value. Cardinality is significant: a restriction declared
/// with one value stays single-valued even when the store could hold a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RestrictionValue {
    Single(String),
    Multi(Vec<String>),
}

impl RestrictionValue {
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}

/// Where a new entry goes in the node's access-control list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AceOrder {
    First,
    Last,
    Before(String),
    After(String),
}

impl AceOrder {
    /// Parses `first`, `last`, `before <principal>` or `after <principal>`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("first") {
            return Some(Self::First);
        }
        if s.eq_ignore_ascii_case("last") {
            return Some(Self::Last);
        }
        let (keyword, principal) = s.split_once(char::is_whitespace)?;
        let principal = principal.trim();
        if principal.is_empty() {
            return None;
        }
        if keyword.eq_ignore_ascii_case("before") {
            Some(Self::Before(principal.to_string()))
        } else if keyword.eq_ignore_ascii_case("after") {
            Some(Self::After(principal.to_string()))
        } else {
            None
        }
    }
}

/// One access-control entry declaration: a principal with ordered granted
/// and denied privileges and optional named restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub principal: String,
    #[serde(default)]
    pub granted: Vec<String>,
    #[serde(default)]
    pub denied: Vec<String>,
    #[serde(default)]
    pub order: Option<AceOrder>,
    #[serde(default)]
    pub restrictions: BTreeMap<String, RestrictionValue>,
}

impl AccessControlEntry {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            granted: Vec::new(),
            denied: Vec::new(),
            order: None,
            restrictions: BTreeMap::new(),
        }
    }

    pub fn grant(mut self, privilege: impl Into<String>) -> Self {
        self.granted.push(privilege.into());
        self
    }

    pub fn deny(mut self, privilege: impl Into<String>) -> Self {
        self.denied.push(privilege.into());
        self
    }

    pub fn restrict(mut self, name: impl Into<String>, value: RestrictionValue) -> Self {
        self.restrictions.insert(name.into(), value);
        self
    }
}

/// User or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    User { password: Option<String> },
    Group { members: Vec<String> },
}

/// A principal to create if it does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalDefinition {
    pub name: String,
    pub kind: PrincipalKind,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl PrincipalDefinition {
    pub fn user(name: impl Into<String>, password: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::User { password },
            properties: BTreeMap::new(),
        }
    }

    pub fn group(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::Group { members },
            properties: BTreeMap::new(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, PrincipalKind::Group { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ace_order_parsing() {
        assert_eq!(AceOrder::parse("first"), Some(AceOrder::First));
        assert_eq!(AceOrder::parse("LAST"), Some(AceOrder::Last));
        assert_eq!(AceOrder::parse("before everyone"), Some(AceOrder::Before("everyone".into())));
        assert_eq!(AceOrder::parse("after  admin "), Some(AceOrder::After("admin".into())));
        assert_eq!(AceOrder::parse("before"), None);
        assert_eq!(AceOrder::parse("sideways x"), None);
    }
}
