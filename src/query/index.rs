//! Index statements for a node schema.

use std::collections::BTreeSet;

use super::statement::{Operation, Statement};
use crate::model::NodeSchema;

/// One `CREATE INDEX IF NOT EXISTS` statement per `(label, attribute)` pair the
/// upsert and cleanup statements of `schema` look nodes up by.
///
/// Covers the schema's own labels (`id`, `lastupdated` and every
/// `extra_index` attribute) and the target label of every relationship (`id`,
/// `lastupdated` and every matcher key). Duplicates are emitted once, in
/// first-seen order.
pub fn build_create_index_queries(schema: &NodeSchema) -> Vec<Statement> {
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    let mut seen = BTreeSet::new();
    let mut push = |label, property| {
        if seen.insert((label, property)) {
            pairs.push((label, property));
        }
    };

    let extra_index: Vec<&str> = schema
        .properties()
        .iter()
        .filter(|(_, prop)| prop.is_extra_index())
        .map(|(attribute, _)| attribute)
        .collect();
    let own_labels = std::iter::once(schema.label())
        .chain(schema.extra_labels().iter().map(String::as_str));
    for label in own_labels {
        push(label, "id");
        push(label, "lastupdated");
        for attribute in &extra_index {
            push(label, *attribute);
        }
    }

    for rel in schema.relationships() {
        let target = rel.target_node_label();
        push(target, "id");
        push(target, "lastupdated");
        for (attribute, _) in rel.target_node_matcher().iter() {
            push(target, attribute);
        }
    }

    pairs
        .into_iter()
        .map(|(label, property)| {
            Statement::new(
                format!("CREATE INDEX IF NOT EXISTS FOR (n:{label}) ON (n.{property});"),
                Operation::CreateIndex {
                    label: label.to_owned(),
                    property: property.to_owned(),
                },
                BTreeSet::new(),
            )
        })
        .collect()
}
