//! Staleness cleanup statements.
//!
//! Cleanup only ever touches data owned by one sub resource instance: every
//! statement starts from the sub resource node located by run parameters and
//! walks to the owned nodes through the sub resource relationship.

use std::collections::BTreeSet;

use super::builder::{matcher_predicate, rel_pattern};
use super::errors::SchemaError;
use super::statement::{CleanupPlan, CleanupTarget, Operation, Statement, LIMIT_SIZE, UPDATE_TAG};
use crate::model::{NodeSchema, RelSchema};

/// Builds the cleanup statements for `schema`, in execution order: stale
/// nodes, then stale sub resource relationships, then stale relationships of
/// each other relationship type.
///
/// Every statement is iterative: it deletes at most `$LIMIT_SIZE` entities and
/// must be repeated until it reports nothing deleted. An entity is stale when
/// its `lastupdated` is missing or differs from `$UPDATE_TAG`.
pub fn build_cleanup_queries(schema: &NodeSchema) -> Result<Vec<Statement>, SchemaError> {
    let sub = schema
        .sub_resource_relationship()
        .ok_or_else(|| SchemaError::MissingSubResource {
            label: schema.label().to_owned(),
        })?;
    if let Some((key, _)) = sub
        .target_node_matcher()
        .iter()
        .find(|(_, prop)| !prop.is_run_param())
    {
        return Err(SchemaError::SubResourceNotRunScoped {
            rel: sub.key().to_string(),
            key: key.to_owned(),
        });
    }

    let mut parameters = BTreeSet::from([UPDATE_TAG.to_owned(), LIMIT_SIZE.to_owned()]);
    let scope = format!(
        "MATCH {}\nWHERE {}",
        rel_pattern(
            &format!("n:{}", schema.label()),
            "s",
            &format!("sub:{}", sub.target_node_label()),
            sub
        ),
        matcher_predicate("sub", sub, &mut parameters)
    );

    let plan = |target| {
        Operation::Cleanup(CleanupPlan {
            label: schema.label().to_owned(),
            sub_resource: sub.clone(),
            target,
        })
    };

    let mut statements = Vec::with_capacity(2 + schema.other_relationships().len());
    statements.push(
        Statement::new(
            format!(
                "{scope}\nWITH n\nWHERE n.lastupdated IS NULL OR n.lastupdated <> $UPDATE_TAG\nWITH n LIMIT $LIMIT_SIZE\nDETACH DELETE n\nRETURN COUNT(*) AS TotalCompleted;"
            ),
            plan(CleanupTarget::StaleNodes),
            parameters.clone(),
        )
        .iterative(),
    );
    statements.push(
        Statement::new(
            format!(
                "{scope}\nWITH s\nWHERE s.lastupdated IS NULL OR s.lastupdated <> $UPDATE_TAG\nWITH s LIMIT $LIMIT_SIZE\nDELETE s\nRETURN COUNT(*) AS TotalCompleted;"
            ),
            plan(CleanupTarget::StaleSubResourceRels),
            parameters.clone(),
        )
        .iterative(),
    );
    for rel in schema.other_relationships() {
        statements.push(
            Statement::new(
                format!(
                    "{scope}\nMATCH {}\nWHERE r.lastupdated IS NULL OR r.lastupdated <> $UPDATE_TAG\nWITH r LIMIT $LIMIT_SIZE\nDELETE r\nRETURN COUNT(*) AS TotalCompleted;",
                    other_pattern(rel)
                ),
                plan(CleanupTarget::StaleRels(rel.clone())),
                parameters.clone(),
            )
            .iterative(),
        );
    }
    tracing::debug!(
        label = schema.label(),
        statements = statements.len(),
        "query.build_cleanup"
    );
    Ok(statements)
}

fn other_pattern(rel: &RelSchema) -> String {
    rel_pattern("n", "r", &format!(":{}", rel.target_node_label()), rel)
}
