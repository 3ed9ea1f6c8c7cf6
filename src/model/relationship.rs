//! Relationship descriptors.

use std::fmt;
use std::str::FromStr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::property::{PropertyMap, PropertyRef};
use crate::query::errors::{check_identifier, SchemaError};

/// Orientation of a relationship relative to the node that declares it.
///
/// `Outward` draws `(node)-[:REL]->(target)`, `Inward` draws
/// `(node)<-[:REL]-(target)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    /// The target points at the declaring node.
    Inward,
    /// The declaring node points at the target.
    Outward,
}

/// Attribute-name → [`PropertyRef`] pairs that locate the target node(s).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetNodeMatcher(PropertyMap);

impl TargetNodeMatcher {
    /// Creates an empty matcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key on the target node.
    pub fn key(mut self, attribute: impl Into<String>, prop: PropertyRef) -> Self {
        self.0.push(attribute, prop);
        self
    }

    /// Iterates keys in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyRef)> {
        self.0.iter()
    }

    /// Whether no key is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identifies a relationship on a node schema for selection purposes.
///
/// Written as `REL_LABEL:TargetLabel`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelKey {
    /// Relationship type.
    pub rel_label: String,
    /// Label of the node at the other end.
    pub target_node_label: String,
}

impl RelKey {
    /// Builds a key from its parts.
    pub fn new(rel_label: impl Into<String>, target_node_label: impl Into<String>) -> Self {
        Self {
            rel_label: rel_label.into(),
            target_node_label: target_node_label.into(),
        }
    }
}

impl fmt::Display for RelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rel_label, self.target_node_label)
    }
}

impl FromStr for RelKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((rel, target)) if !rel.is_empty() && !target.is_empty() => {
                Ok(RelKey::new(rel, target))
            }
            _ => Err(format!("expected REL_LABEL:TargetLabel, got '{s}'")),
        }
    }
}

/// Declarative description of one relationship type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRelSchema")]
pub struct RelSchema {
    target_node_label: String,
    target_node_matcher: TargetNodeMatcher,
    direction: LinkDirection,
    rel_label: String,
    properties: PropertyMap,
}

impl RelSchema {
    /// Starts a relationship towards `target_node_label`.
    ///
    /// The matcher and properties are added with [`RelSchema::matching`] and
    /// [`RelSchema::property`]; the owning node schema validates the result.
    pub fn new(
        target_node_label: impl Into<String>,
        rel_label: impl Into<String>,
        direction: LinkDirection,
    ) -> Self {
        Self {
            target_node_label: target_node_label.into(),
            target_node_matcher: TargetNodeMatcher::new(),
            direction,
            rel_label: rel_label.into(),
            properties: PropertyMap::new(),
        }
    }

    /// Adds a target node matcher key.
    pub fn matching(mut self, attribute: impl Into<String>, prop: PropertyRef) -> Self {
        self.target_node_matcher = self.target_node_matcher.key(attribute, prop);
        self
    }

    /// Replaces the target node matcher.
    pub fn with_matcher(mut self, matcher: TargetNodeMatcher) -> Self {
        self.target_node_matcher = matcher;
        self
    }

    /// Adds a relationship property.
    pub fn property(mut self, attribute: impl Into<String>, prop: PropertyRef) -> Self {
        self.properties.push(attribute, prop);
        self
    }

    /// Label of the node at the other end.
    pub fn target_node_label(&self) -> &str {
        &self.target_node_label
    }

    /// Matcher locating the target node(s).
    pub fn target_node_matcher(&self) -> &TargetNodeMatcher {
        &self.target_node_matcher
    }

    /// Arrow orientation.
    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    /// Relationship type.
    pub fn rel_label(&self) -> &str {
        &self.rel_label
    }

    /// Relationship properties.
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// Selection key of this relationship.
    pub fn key(&self) -> RelKey {
        RelKey::new(&self.rel_label, &self.target_node_label)
    }

    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        let owner = self.key().to_string();
        check_identifier("label", &self.target_node_label)?;
        check_identifier("relationship", &self.rel_label)?;
        if self.target_node_matcher.is_empty() {
            return Err(SchemaError::EmptyMatcher { rel: owner });
        }
        for (attribute, _) in self.target_node_matcher.iter() {
            check_identifier("property", attribute)?;
        }
        match self.properties.get("lastupdated") {
            None => {
                return Err(SchemaError::MalformedRelProperties {
                    rel: owner,
                    reason: "missing 'lastupdated'".into(),
                })
            }
            Some(prop) if !prop.is_run_stamp() => {
                return Err(SchemaError::InvalidRunTag { owner });
            }
            Some(_) => {}
        }
        if let Some(dup) = self.properties.first_duplicate() {
            return Err(SchemaError::DuplicateProperty {
                owner,
                property: dup.to_owned(),
            });
        }
        for (attribute, prop) in self.properties.iter() {
            check_identifier("property", attribute)?;
            if attribute == "firstseen" {
                return Err(SchemaError::ReservedProperty {
                    owner,
                    property: attribute.to_owned(),
                });
            }
            if prop.is_ignore_case() {
                return Err(SchemaError::IgnoreCaseOutsideMatcher {
                    owner,
                    property: attribute.to_owned(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRelProperties {
    Table(PropertyMap),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
struct RawRelSchema {
    target_node_label: String,
    target_node_matcher: TargetNodeMatcher,
    direction: LinkDirection,
    rel_label: String,
    properties: Option<RawRelProperties>,
}

impl TryFrom<RawRelSchema> for RelSchema {
    type Error = SchemaError;

    fn try_from(raw: RawRelSchema) -> Result<Self, Self::Error> {
        let rel = RelKey::new(&raw.rel_label, &raw.target_node_label).to_string();
        let properties = match raw.properties {
            Some(RawRelProperties::Table(map)) => map,
            Some(RawRelProperties::Other(_)) => {
                return Err(SchemaError::MalformedRelProperties {
                    rel,
                    reason: "expected a table of property references".into(),
                })
            }
            None => {
                return Err(SchemaError::MalformedRelProperties {
                    rel,
                    reason: "no properties declared".into(),
                })
            }
        };
        let schema = RelSchema {
            target_node_label: raw.target_node_label,
            target_node_matcher: raw.target_node_matcher,
            direction: raw.direction,
            rel_label: raw.rel_label,
            properties,
        };
        schema.validate()?;
        Ok(schema)
    }
}
