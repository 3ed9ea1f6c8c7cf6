//! Compiled statements.
//!
//! A [`Statement`] pairs the Cypher text generated for a schema with a
//! structured [`Operation`] describing the same work. Stores that speak Cypher
//! send the text; the in-process store executes the operation directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use super::value::{Record, Value};
use crate::model::{NodeSchema, RelSchema};

/// Parameter carrying the record batch of an upsert.
pub const DICT_LIST: &str = "DictList";
/// Parameter carrying the run tag of a cleanup statement.
pub const UPDATE_TAG: &str = "UPDATE_TAG";
/// Parameter bounding how many entities a cleanup iteration deletes.
pub const LIMIT_SIZE: &str = "LIMIT_SIZE";
/// Attribute and run parameter holding the freshness tag.
pub const LASTUPDATED: &str = "lastupdated";

/// Structured form of a compiled statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Merge one node per record plus the selected relationships.
    Upsert(UpsertPlan),
    /// Ensure an index on `(label, property)` exists.
    CreateIndex {
        /// Indexed label.
        label: String,
        /// Indexed attribute.
        property: String,
    },
    /// Delete one bounded slice of stale entities.
    Cleanup(CleanupPlan),
}

/// Node schema together with the relationships selected for this statement.
#[derive(Clone, Debug, PartialEq)]
pub struct UpsertPlan {
    /// Schema of the merged nodes.
    pub schema: Arc<NodeSchema>,
    /// Relationships merged for every record, sub resource first.
    pub relationships: Vec<RelSchema>,
}

/// What a cleanup statement deletes.
#[derive(Clone, Debug, PartialEq)]
pub enum CleanupTarget {
    /// Stale nodes attached to the sub resource, detached first.
    StaleNodes,
    /// Stale relationships between the nodes and their sub resource.
    StaleSubResourceRels,
    /// Stale relationships of the given type from nodes owned by the sub resource.
    StaleRels(RelSchema),
}

/// Cleanup scoped to the nodes of `label` owned by one sub resource.
#[derive(Clone, Debug, PartialEq)]
pub struct CleanupPlan {
    /// Label of the swept nodes.
    pub label: String,
    /// Relationship linking the nodes to their sub resource.
    pub sub_resource: RelSchema,
    /// Entities deleted by this statement.
    pub target: CleanupTarget,
}

/// A compiled statement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Statement {
    query: String,
    #[serde(skip)]
    operation: Operation,
    parameters: BTreeSet<String>,
    iterative: bool,
}

impl Statement {
    pub(crate) fn new(query: String, operation: Operation, parameters: BTreeSet<String>) -> Self {
        Self {
            query,
            operation,
            parameters,
            iterative: false,
        }
    }

    pub(crate) fn iterative(mut self) -> Self {
        self.iterative = true;
        self
    }

    /// Cypher text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Structured form.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Names of the run-scoped parameters the statement reads.
    pub fn parameters(&self) -> &BTreeSet<String> {
        &self.parameters
    }

    /// Whether the statement must be repeated until it affects nothing.
    pub fn is_iterative(&self) -> bool {
        self.iterative
    }

    /// Parameters from `available` that this statement needs but are absent.
    pub fn missing_parameters<'a>(
        &'a self,
        available: &'a BTreeMap<String, Value>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.parameters
            .iter()
            .filter(move |name| !available.contains_key(name.as_str()))
            .map(String::as_str)
    }
}

/// Values bound to a statement at execution time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters {
    /// Record batch (`$DictList`) for upserts.
    pub records: Vec<Record>,
    /// Named scalar parameters.
    pub values: BTreeMap<String, Value>,
}

impl Parameters {
    /// Scalar parameters only.
    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            records: Vec::new(),
            values,
        }
    }

    /// Looks up a scalar parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}
