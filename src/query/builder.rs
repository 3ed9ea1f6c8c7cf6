//! Ingestion query compiler.
//!
//! Turns a [`NodeSchema`] and a relationship selection into a single batched
//! upsert of the form
//!
//! ```text
//! UNWIND $DictList AS item
//!     MERGE (i:Label {id: item.id})
//!     ON CREATE SET i.firstseen = timestamp()
//!     SET
//!         i.lastupdated = CASE WHEN i.lastupdated IS NULL OR i.lastupdated < $lastupdated THEN $lastupdated ELSE i.lastupdated END,
//!         i.name = coalesce(item.name, i.name)
//!     WITH i, item
//!     CALL {
//!         WITH i, item
//!         OPTIONAL MATCH (j:Target) WHERE j.id = $sub_resource_id
//!         WITH i, item, j WHERE j IS NOT NULL
//!         MERGE (i)<-[r:RESOURCE]-(j)
//!         ON CREATE SET r.firstseen = timestamp()
//!         SET
//!             r.lastupdated = CASE WHEN r.lastupdated IS NULL OR r.lastupdated < $lastupdated THEN $lastupdated ELSE r.lastupdated END
//!     }
//! ```
//!
//! `lastupdated` is only ever raised, so replaying an older batch never makes
//! a freshly observed entity look stale.
//!
//! Each relationship lives in its own sub-query so that a record whose target
//! does not exist still writes the node and every other relationship.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use super::errors::SchemaError;
use super::statement::{Operation, Statement, UpsertPlan, LASTUPDATED};
use crate::model::{LinkDirection, NodeSchema, PropertyMap, PropertyRef, RelKey, RelSchema, Source};

/// Which relationships of a schema a compiled statement merges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RelSelection {
    /// Sub resource plus every other relationship.
    #[default]
    All,
    /// Exactly these relationships; an empty set merges the nodes only.
    Only(BTreeSet<RelKey>),
}

impl RelSelection {
    /// Selects no relationship.
    pub fn none() -> Self {
        RelSelection::Only(BTreeSet::new())
    }

    /// Selects the given relationships.
    pub fn only<I: IntoIterator<Item = RelKey>>(keys: I) -> Self {
        RelSelection::Only(keys.into_iter().collect())
    }

    /// Resolves the selection against `schema`, keeping schema order.
    pub fn resolve(&self, schema: &NodeSchema) -> Result<Vec<RelSchema>, SchemaError> {
        match self {
            RelSelection::All => Ok(schema.relationships().cloned().collect()),
            RelSelection::Only(keys) => {
                if let Some(unknown) = keys.iter().find(|key| schema.relationship(key).is_none()) {
                    return Err(SchemaError::UnknownRelationship {
                        label: schema.label().to_owned(),
                        rel: unknown.to_string(),
                    });
                }
                Ok(schema
                    .relationships()
                    .filter(|rel| keys.contains(&rel.key()))
                    .cloned()
                    .collect())
            }
        }
    }
}

/// Compiles the upsert statement for `schema` restricted to `selection`.
///
/// The returned statement lists every run-scoped parameter it reads, so
/// callers can check their inputs before executing anything.
pub fn build_ingestion_query(
    schema: &NodeSchema,
    selection: &RelSelection,
) -> Result<Statement, SchemaError> {
    let relationships = selection.resolve(schema)?;

    let mut query = String::new();
    let mut parameters = BTreeSet::new();
    let id = schema.id_property();
    let _ = writeln!(query, "UNWIND $DictList AS item");
    let _ = write!(
        query,
        "    MERGE (i:{} {{id: item.{}}})",
        schema.label(),
        escape(id.name())
    );
    query.push('\n');
    let merged = Merged::node(schema.properties());
    write_on_create(&mut query, "i", "    ", merged, &mut parameters);
    let mut set_items = set_items("i", merged, &mut parameters);
    set_items.extend(schema.extra_labels().iter().map(|label| format!("i:{label}")));
    write_set(&mut query, "    ", &set_items);

    if !relationships.is_empty() {
        query.push_str("\n    WITH i, item");
    }
    for rel in &relationships {
        query.push('\n');
        write_rel_subquery(&mut query, rel, &mut parameters);
    }

    tracing::debug!(
        label = schema.label(),
        relationships = relationships.len(),
        "query.build_ingestion"
    );
    Ok(Statement::new(
        query,
        Operation::Upsert(UpsertPlan {
            schema: Arc::new(schema.clone()),
            relationships,
        }),
        parameters,
    ))
}

fn write_rel_subquery(query: &mut String, rel: &RelSchema, parameters: &mut BTreeSet<String>) {
    let _ = writeln!(query, "    CALL {{");
    let _ = writeln!(query, "        WITH i, item");
    let _ = writeln!(
        query,
        "        OPTIONAL MATCH (j:{}) WHERE {}",
        rel.target_node_label(),
        matcher_predicate("j", rel, parameters)
    );
    let _ = writeln!(query, "        WITH i, item, j WHERE j IS NOT NULL");
    let _ = writeln!(query, "        MERGE {}", rel_pattern("i", "r", "j", rel));
    let merged = Merged::relationship(rel.properties());
    write_on_create(query, "r", "        ", merged, parameters);
    let items = set_items("r", merged, parameters);
    write_set(query, "        ", &items);
    query.push_str("\n    }");
}

/// `(a)-[r:REL]->(b)` or `(a)<-[r:REL]-(b)` depending on direction.
pub(crate) fn rel_pattern(node: &str, rel_var: &str, target: &str, rel: &RelSchema) -> String {
    match rel.direction() {
        LinkDirection::Outward => format!(
            "({node})-[{rel_var}:{}]->({target})",
            rel.rel_label()
        ),
        LinkDirection::Inward => format!(
            "({node})<-[{rel_var}:{}]-({target})",
            rel.rel_label()
        ),
    }
}

/// `j.key = <value> AND toLower(j.other) = toLower(<value>)`.
pub(crate) fn matcher_predicate(
    var: &str,
    rel: &RelSchema,
    parameters: &mut BTreeSet<String>,
) -> String {
    rel.target_node_matcher()
        .iter()
        .map(|(key, prop)| {
            let value = value_expr(prop, parameters);
            if prop.is_ignore_case() {
                format!("toLower({var}.{key}) = toLower({value})")
            } else {
                format!("{var}.{key} = {value}")
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Expression reading the raw value of `prop` (record key or run parameter).
pub(crate) fn value_expr(prop: &PropertyRef, parameters: &mut BTreeSet<String>) -> String {
    match prop.source() {
        Source::RunParam => {
            parameters.insert(prop.name().to_owned());
            format!("${}", escape(prop.name()))
        }
        Source::Record | Source::RecordWithFallback => format!("item.{}", escape(prop.name())),
    }
}

/// Attributes written by a merge, minus the merge key itself.
#[derive(Clone, Copy)]
struct Merged<'a> {
    properties: &'a PropertyMap,
    key: Option<&'static str>,
}

impl<'a> Merged<'a> {
    fn node(properties: &'a PropertyMap) -> Self {
        Self {
            properties,
            key: Some("id"),
        }
    }

    fn relationship(properties: &'a PropertyMap) -> Self {
        Self {
            properties,
            key: None,
        }
    }

    fn iter(self) -> impl Iterator<Item = (&'a str, &'a PropertyRef)> {
        self.properties
            .iter()
            .filter(move |(attribute, _)| Some(*attribute) != self.key)
    }
}

fn write_on_create(
    query: &mut String,
    var: &str,
    indent: &str,
    merged: Merged<'_>,
    parameters: &mut BTreeSet<String>,
) {
    let mut items = vec![format!("{var}.firstseen = timestamp()")];
    for (attribute, prop) in merged.iter() {
        if !prop.is_create_only() {
            continue;
        }
        items.push(format!("{var}.{attribute} = {}", value_expr(prop, parameters)));
    }
    let _ = write!(query, "{indent}ON CREATE SET {}", items.join(", "));
}

fn set_items(var: &str, merged: Merged<'_>, parameters: &mut BTreeSet<String>) -> Vec<String> {
    merged
        .iter()
        .filter(|(_, prop)| !prop.is_create_only())
        .map(|(attribute, prop)| {
            let value = value_expr(prop, parameters);
            if attribute == LASTUPDATED {
                return format!(
                    "{var}.{attribute} = CASE WHEN {var}.{attribute} IS NULL OR {var}.{attribute} < {value} THEN {value} ELSE {var}.{attribute} END"
                );
            }
            match prop.source() {
                Source::RecordWithFallback => {
                    format!("{var}.{attribute} = coalesce({value}, {var}.{attribute})")
                }
                Source::Record | Source::RunParam => format!("{var}.{attribute} = {value}"),
            }
        })
        .collect()
}

fn write_set(query: &mut String, indent: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = write!(query, "\n{indent}SET");
    for (idx, item) in items.iter().enumerate() {
        let sep = if idx + 1 == items.len() { "" } else { "," };
        let _ = write!(query, "\n{indent}    {item}{sep}");
    }
}

/// Backtick-quotes names that are not plain identifiers.
pub(crate) fn escape(name: &str) -> Cow<'_, str> {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{}`", name.replace('`', "``")))
    }
}
