//! Node (entity type) descriptors.

use serde::{Deserialize, Serialize};

use super::property::{PropertyMap, PropertyRef, Source};
use super::relationship::{RelKey, RelSchema};
use crate::query::errors::{check_identifier, SchemaError};

/// Attributes every node schema must declare.
pub const REQUIRED_NODE_PROPERTIES: [&str; 2] = ["id", "lastupdated"];

/// Attribute set automatically on creation.
pub const FIRSTSEEN: &str = "firstseen";

/// Immutable description of one entity type.
///
/// Construct with [`NodeSchema::builder`] or deserialize from a schema file;
/// both paths validate the schema once, so a `NodeSchema` value is always
/// well formed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawNodeSchema")]
pub struct NodeSchema {
    label: String,
    #[serde(skip)]
    id: PropertyRef,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extra_labels: Vec<String>,
    properties: PropertyMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_resource_relationship: Option<RelSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    other_relationships: Vec<RelSchema>,
}

impl NodeSchema {
    /// Starts a schema for nodes labelled `label`.
    pub fn builder(label: impl Into<String>) -> NodeSchemaBuilder {
        NodeSchemaBuilder {
            raw: RawNodeSchema {
                label: label.into(),
                extra_labels: Vec::new(),
                properties: PropertyMap::new(),
                sub_resource_relationship: None,
                other_relationships: Vec::new(),
            },
        }
    }

    /// Primary label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Additional labels applied to every node.
    pub fn extra_labels(&self) -> &[String] {
        &self.extra_labels
    }

    /// Node properties, including `id` and `lastupdated`.
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// The rule for the identity key.
    pub fn id_property(&self) -> &PropertyRef {
        &self.id
    }

    /// Relationship to the owning sub resource, when any.
    pub fn sub_resource_relationship(&self) -> Option<&RelSchema> {
        self.sub_resource_relationship.as_ref()
    }

    /// Additional relationships.
    pub fn other_relationships(&self) -> &[RelSchema] {
        &self.other_relationships
    }

    /// All relationships, sub resource first.
    pub fn relationships(&self) -> impl Iterator<Item = &RelSchema> {
        self.sub_resource_relationship
            .iter()
            .chain(self.other_relationships.iter())
    }

    /// Finds a relationship by key.
    pub fn relationship(&self, key: &RelKey) -> Option<&RelSchema> {
        self.relationships().find(|rel| &rel.key() == key)
    }

    /// Whether `key` names the sub resource relationship.
    pub fn is_sub_resource(&self, key: &RelKey) -> bool {
        self.sub_resource_relationship
            .as_ref()
            .is_some_and(|rel| &rel.key() == key)
    }
}

/// Builder for [`NodeSchema`].
#[derive(Debug)]
pub struct NodeSchemaBuilder {
    raw: RawNodeSchema,
}

impl NodeSchemaBuilder {
    /// Adds an extra label.
    pub fn extra_label(mut self, label: impl Into<String>) -> Self {
        self.raw.extra_labels.push(label.into());
        self
    }

    /// Adds a node property.
    pub fn property(mut self, attribute: impl Into<String>, prop: PropertyRef) -> Self {
        self.raw.properties.push(attribute, prop);
        self
    }

    /// Sets the sub resource relationship.
    pub fn sub_resource(mut self, rel: RelSchema) -> Self {
        self.raw.sub_resource_relationship = Some(rel);
        self
    }

    /// Adds another relationship.
    pub fn relationship(mut self, rel: RelSchema) -> Self {
        self.raw.other_relationships.push(rel);
        self
    }

    /// Validates and freezes the schema.
    pub fn build(self) -> Result<NodeSchema, SchemaError> {
        NodeSchema::try_from(self.raw)
    }
}

#[derive(Debug, Deserialize)]
struct RawNodeSchema {
    label: String,
    #[serde(default)]
    extra_labels: Vec<String>,
    properties: PropertyMap,
    #[serde(default)]
    sub_resource_relationship: Option<RelSchema>,
    #[serde(default)]
    other_relationships: Vec<RelSchema>,
}

impl TryFrom<RawNodeSchema> for NodeSchema {
    type Error = SchemaError;

    fn try_from(raw: RawNodeSchema) -> Result<Self, Self::Error> {
        if raw.label.is_empty() {
            return Err(SchemaError::EmptyLabel);
        }
        check_identifier("label", &raw.label)?;
        for label in &raw.extra_labels {
            check_identifier("label", label)?;
        }
        let id = validate_node_properties(&raw.label, &raw.properties)?;

        if let Some(sub) = &raw.sub_resource_relationship {
            sub.validate()?;
            if let Some((key, _)) = sub
                .target_node_matcher()
                .iter()
                .find(|(_, prop)| prop.is_ignore_case())
            {
                return Err(SchemaError::IgnoreCaseOnSubResource {
                    rel: sub.key().to_string(),
                    key: key.to_owned(),
                });
            }
        }
        let mut seen: Vec<RelKey> = Vec::new();
        for rel in raw
            .sub_resource_relationship
            .iter()
            .chain(raw.other_relationships.iter())
        {
            rel.validate()?;
            let key = rel.key();
            if seen.contains(&key) {
                return Err(SchemaError::DuplicateRelationship {
                    label: raw.label.clone(),
                    rel: key.to_string(),
                });
            }
            seen.push(key);
        }

        Ok(NodeSchema {
            label: raw.label,
            id,
            extra_labels: raw.extra_labels,
            properties: raw.properties,
            sub_resource_relationship: raw.sub_resource_relationship,
            other_relationships: raw.other_relationships,
        })
    }
}

fn validate_node_properties(
    label: &str,
    properties: &PropertyMap,
) -> Result<PropertyRef, SchemaError> {
    for required in REQUIRED_NODE_PROPERTIES {
        if !properties.contains(required) {
            return Err(SchemaError::MissingProperty {
                owner: label.to_owned(),
                property: required,
            });
        }
    }
    if let Some(dup) = properties.first_duplicate() {
        return Err(SchemaError::DuplicateProperty {
            owner: label.to_owned(),
            property: dup.to_owned(),
        });
    }
    for (attribute, prop) in properties.iter() {
        check_identifier("property", attribute)?;
        if attribute == FIRSTSEEN {
            return Err(SchemaError::ReservedProperty {
                owner: label.to_owned(),
                property: attribute.to_owned(),
            });
        }
        if prop.is_ignore_case() {
            return Err(SchemaError::IgnoreCaseOutsideMatcher {
                owner: label.to_owned(),
                property: attribute.to_owned(),
            });
        }
    }
    if properties
        .get("lastupdated")
        .is_some_and(|prop| !prop.is_run_stamp())
    {
        return Err(SchemaError::InvalidRunTag {
            owner: label.to_owned(),
        });
    }
    match properties.get("id") {
        Some(id) if id.source() != Source::RunParam && !id.is_create_only() => Ok(id.clone()),
        _ => Err(SchemaError::InvalidIdentity {
            owner: label.to_owned(),
        }),
    }
}
