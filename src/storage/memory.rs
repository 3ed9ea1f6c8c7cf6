//! In-process property graph executing the structured form of statements.
//!
//! Nodes and relationships live in hash maps keyed by monotonically allocated
//! ids. Two secondary structures keep merges cheap: a `(label, id)` identity
//! index covering every label a node carries, and per-node adjacency lists.
//! Extra labels may be shared by several entity types, so one identity can
//! resolve to more than one node.
//! A statement runs under a single write lock, and all input validation
//! happens before the first mutation, so a rejected statement changes nothing.

use std::collections::{BTreeSet, VecDeque};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use super::{unix_millis, GraphSession, StoreError, Summary};
use crate::model::{LinkDirection, PropertyMap, PropertyRef, RelSchema, Source, FIRSTSEEN};
use crate::query::{
    CleanupPlan, CleanupTarget, IdentityKey, Operation, Parameters, Record, Statement, UpsertPlan,
    Value, LASTUPDATED, LIMIT_SIZE, UPDATE_TAG,
};

type NodeId = u64;
type EdgeId = u64;
type Adjacency = SmallVec<[EdgeId; 4]>;

static NULL: Value = Value::Null;

#[derive(Clone, Debug, Default)]
struct NodeData {
    labels: BTreeSet<String>,
    props: Record,
}

#[derive(Clone, Debug)]
struct EdgeData {
    rel_type: String,
    from: NodeId,
    to: NodeId,
    props: Record,
}

#[derive(Default)]
struct GraphState {
    next_node: NodeId,
    next_edge: EdgeId,
    nodes: FxHashMap<NodeId, NodeData>,
    edges: FxHashMap<EdgeId, EdgeData>,
    by_label: FxHashMap<String, BTreeSet<NodeId>>,
    by_identity: FxHashMap<(String, IdentityKey), BTreeSet<NodeId>>,
    outgoing: FxHashMap<NodeId, Adjacency>,
    incoming: FxHashMap<NodeId, Adjacency>,
    edge_keys: FxHashMap<(NodeId, NodeId, String), EdgeId>,
    indexes: BTreeSet<(String, String)>,
}

/// Read-only copy of a stored node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeView {
    /// Labels in lexical order.
    pub labels: Vec<String>,
    /// Stored attributes.
    pub properties: Record,
}

impl NodeView {
    /// Attribute value, if set.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.properties.get(attribute)
    }

    /// Whether the node carries `label`.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Read-only copy of a stored relationship.
#[derive(Clone, Debug, PartialEq)]
pub struct RelView {
    /// Relationship type.
    pub rel_type: String,
    /// `id` of the start node.
    pub from_id: Value,
    /// `id` of the end node.
    pub to_id: Value,
    /// Stored attributes.
    pub properties: Record,
}

impl RelView {
    /// Attribute value, if set.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.properties.get(attribute)
    }
}

/// A scripted failure returned by [`MemoryGraph::run`].
///
/// Used by tests to simulate store outages and rejected statements.
#[derive(Clone, Debug)]
pub struct Fault {
    error: StoreError,
    label: Option<String>,
    skip: usize,
    times: usize,
}

impl Fault {
    /// Fails the next statement once with `error`.
    pub fn new(error: StoreError) -> Self {
        Self {
            error,
            label: None,
            skip: 0,
            times: 1,
        }
    }

    /// Only statements working on `label` trigger the fault.
    pub fn on_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Lets `count` matching statements through before failing.
    pub fn after(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    /// Fails `count` matching statements in a row.
    pub fn times(mut self, count: usize) -> Self {
        self.times = count;
        self
    }

    fn matches(&self, label: &str) -> bool {
        self.label.as_deref().map_or(true, |l| l == label)
    }
}

/// Thread-safe in-memory graph store.
#[derive(Default)]
pub struct MemoryGraph {
    state: RwLock<GraphState>,
    faults: Mutex<VecDeque<Fault>>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a scripted failure.
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Inserts a node directly, or adds attributes to the node already
    /// identified by the first label and `id`.
    pub fn insert_node(&self, labels: &[&str], properties: Record) -> Result<(), StoreError> {
        let Some((primary, extra)) = labels.split_first() else {
            return Err(StoreError::Rejected("a node needs at least one label".into()));
        };
        let key = properties
            .get("id")
            .and_then(Value::identity_key)
            .ok_or_else(|| StoreError::Rejected(format!("node '{primary}' has a null 'id'")))?;
        let mut state = self.state.write();
        let mut summary = Summary::default();
        let node = state.find_or_create(primary, key, &NULL, &mut summary).0;
        for label in extra {
            state.add_label(node, label, &mut summary);
        }
        if let Some(data) = state.nodes.get_mut(&node) {
            data.props.extend(properties);
        }
        Ok(())
    }

    /// Inserts a relationship directly between two identified nodes, or adds
    /// attributes to the one already there. Nothing is stamped.
    pub fn insert_relationship(
        &self,
        from: (&str, impl Into<Value>),
        rel_type: &str,
        to: (&str, impl Into<Value>),
        properties: Record,
    ) -> Result<(), StoreError> {
        let from_id = from.1.into();
        let to_id = to.1.into();
        let mut state = self.state.write();
        let endpoint = |label: &str, id: &Value| {
            id.identity_key()
                .and_then(|key| state.identified(label, key))
                .ok_or_else(|| StoreError::Rejected(format!("no '{label}' node with id {id}")))
        };
        let from_node = endpoint(from.0, &from_id)?;
        let to_node = endpoint(to.0, &to_id)?;
        let key = (from_node, to_node, rel_type.to_owned());
        let existing = state.edge_keys.get(&key).copied();
        let edge = match existing {
            Some(edge) => edge,
            None => state.create_edge(key, &NULL),
        };
        if let Some(data) = state.edges.get_mut(&edge) {
            data.props.extend(properties);
        }
        Ok(())
    }

    /// Node of `label` whose `id` equals `id`.
    pub fn node(&self, label: &str, id: impl Into<Value>) -> Option<NodeView> {
        let key = id.into().identity_key()?;
        let state = self.state.read();
        let node = state.identified(label, key)?;
        state.nodes.get(&node).map(view)
    }

    /// Every node carrying `label`, in creation order.
    pub fn nodes(&self, label: &str) -> Vec<NodeView> {
        let state = self.state.read();
        state
            .label_members(label)
            .filter_map(|id| state.nodes.get(&id))
            .map(view)
            .collect()
    }

    /// Number of nodes carrying `label`.
    pub fn node_count(&self, label: &str) -> usize {
        self.state.read().by_label.get(label).map_or(0, BTreeSet::len)
    }

    /// Every relationship of `rel_type`, ordered by creation.
    pub fn relationships(&self, rel_type: &str) -> Vec<RelView> {
        let state = self.state.read();
        let mut edges: Vec<(&EdgeId, &EdgeData)> = state
            .edges
            .iter()
            .filter(|(_, edge)| edge.rel_type == rel_type)
            .collect();
        edges.sort_by_key(|(id, _)| **id);
        edges
            .into_iter()
            .map(|(_, edge)| state.rel_view(edge))
            .collect()
    }

    /// Number of relationships of `rel_type`.
    pub fn relationship_count(&self, rel_type: &str) -> usize {
        self.state
            .read()
            .edges
            .values()
            .filter(|edge| edge.rel_type == rel_type)
            .count()
    }

    /// The `(from)-[:rel_type]->(to)` relationship between two identified nodes.
    pub fn relationship(
        &self,
        from: (&str, impl Into<Value>),
        rel_type: &str,
        to: (&str, impl Into<Value>),
    ) -> Option<RelView> {
        let from_key = from.1.into().identity_key()?;
        let to_key = to.1.into().identity_key()?;
        let state = self.state.read();
        let from_node = state.identified(from.0, from_key)?;
        let to_node = state.identified(to.0, to_key)?;
        let edge = state
            .edge_keys
            .get(&(from_node, to_node, rel_type.to_owned()))?;
        state.edges.get(edge).map(|edge| state.rel_view(edge))
    }

    /// Whether an index on `(label, property)` has been created.
    pub fn has_index(&self, label: &str, property: &str) -> bool {
        self.state
            .read()
            .indexes
            .contains(&(label.to_owned(), property.to_owned()))
    }

    /// Every created index, ordered by label then property.
    pub fn indexes(&self) -> Vec<(String, String)> {
        self.state.read().indexes.iter().cloned().collect()
    }

    fn take_fault(&self, label: &str) -> Option<StoreError> {
        let mut faults = self.faults.lock();
        let position = faults.iter().position(|fault| fault.matches(label))?;
        let fault = &mut faults[position];
        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }
        let error = fault.error.clone();
        fault.times = fault.times.saturating_sub(1);
        if fault.times == 0 {
            faults.remove(position);
        }
        Some(error)
    }
}

impl GraphSession for MemoryGraph {
    fn run(&self, statement: &Statement, params: &Parameters) -> Result<Summary, StoreError> {
        let label = statement_label(statement.operation());
        if let Some(error) = self.take_fault(label) {
            trace!(label, error = %error, "memory.run.fault");
            return Err(error);
        }
        if let Some(missing) = statement.missing_parameters(&params.values).next() {
            return Err(StoreError::Rejected(format!(
                "expected parameter ${missing} is not bound"
            )));
        }
        let mut state = self.state.write();
        let summary = match statement.operation() {
            Operation::Upsert(plan) => state.upsert(plan, params)?,
            Operation::CreateIndex { label, property } => state.create_index(label, property),
            Operation::Cleanup(plan) => state.cleanup(plan, params)?,
        };
        trace!(
            label,
            nodes_created = summary.nodes_created,
            nodes_deleted = summary.nodes_deleted,
            relationships_created = summary.relationships_created,
            relationships_deleted = summary.relationships_deleted,
            "memory.run"
        );
        Ok(summary)
    }
}

fn statement_label(operation: &Operation) -> &str {
    match operation {
        Operation::Upsert(plan) => plan.schema.label(),
        Operation::CreateIndex { label, .. } => label,
        Operation::Cleanup(plan) => &plan.label,
    }
}

fn view(data: &NodeData) -> NodeView {
    NodeView {
        labels: data.labels.iter().cloned().collect(),
        properties: data.props.clone(),
    }
}

/// Raw value a property reference reads, `Null` when absent.
fn lookup<'a>(prop: &PropertyRef, record: &'a Record, params: &'a Parameters) -> &'a Value {
    let value = match prop.source() {
        Source::RunParam => params.get(prop.name()),
        Source::Record | Source::RecordWithFallback => record.get(prop.name()),
    };
    value.unwrap_or(&NULL)
}

fn is_stale(props: &Record, tag: &Value) -> bool {
    props
        .get(LASTUPDATED)
        .map_or(true, |stored| !stored.graph_eq(tag))
}

/// Writes `properties` onto `props`. Null removes the attribute, except for
/// fallback references, which keep the stored value. `lastupdated` is only
/// raised, never lowered.
fn apply_properties(
    props: &mut Record,
    properties: &PropertyMap,
    skip: Option<&str>,
    record: &Record,
    params: &Parameters,
    created: bool,
    summary: &mut Summary,
) {
    for (attribute, prop) in properties.iter() {
        if Some(attribute) == skip || (prop.is_create_only() && !created) {
            continue;
        }
        let value = lookup(prop, record, params);
        if attribute == LASTUPDATED
            && props
                .get(attribute)
                .is_some_and(|stored| !stored.graph_lt(value))
        {
            continue;
        }
        if value.is_null() {
            if prop.source() != Source::RecordWithFallback && props.remove(attribute).is_some() {
                summary.properties_set += 1;
            }
            continue;
        }
        props.insert(attribute.to_owned(), value.clone());
        summary.properties_set += 1;
    }
}

impl GraphState {
    /// Oldest node carrying `label` whose `id` has identity `key`.
    fn identified(&self, label: &str, key: IdentityKey) -> Option<NodeId> {
        self.by_identity
            .get(&(label.to_owned(), key))
            .and_then(|nodes| nodes.first())
            .copied()
    }

    fn label_members(&self, label: &str) -> impl Iterator<Item = NodeId> + '_ {
        self.by_label
            .get(label)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    fn rel_view(&self, edge: &EdgeData) -> RelView {
        let id_of = |node: NodeId| {
            self.nodes
                .get(&node)
                .and_then(|data| data.props.get("id"))
                .cloned()
                .unwrap_or(Value::Null)
        };
        RelView {
            rel_type: edge.rel_type.clone(),
            from_id: id_of(edge.from),
            to_id: id_of(edge.to),
            properties: edge.props.clone(),
        }
    }

    fn create_index(&mut self, label: &str, property: &str) -> Summary {
        let added = self.indexes.insert((label.to_owned(), property.to_owned()));
        Summary {
            indexes_added: u64::from(added),
            ..Summary::default()
        }
    }

    fn upsert(&mut self, plan: &UpsertPlan, params: &Parameters) -> Result<Summary, StoreError> {
        let schema = &plan.schema;
        let id_prop = schema.id_property();
        let keys = params
            .records
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let id = lookup(id_prop, record, params);
                id.identity_key().map(|key| (key, id)).ok_or_else(|| {
                    StoreError::Rejected(format!(
                        "cannot merge {} node from record {idx}: '{}' is null",
                        schema.label(),
                        id_prop.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let now = Value::Int(unix_millis());
        let mut summary = Summary::default();
        for (record, (key, id)) in params.records.iter().zip(keys) {
            let (node, created) = self.find_or_create(schema.label(), key, &now, &mut summary);
            if let Some(data) = self.nodes.get_mut(&node) {
                if created {
                    data.props.insert("id".to_owned(), id.clone());
                    summary.properties_set += 1;
                }
                apply_properties(
                    &mut data.props,
                    schema.properties(),
                    Some("id"),
                    record,
                    params,
                    created,
                    &mut summary,
                );
            }
            for label in schema.extra_labels() {
                self.add_label(node, label, &mut summary);
            }
            for rel in &plan.relationships {
                self.merge_relationships(node, rel, record, params, &now, &mut summary);
            }
        }
        Ok(summary)
    }

    fn find_or_create(
        &mut self,
        label: &str,
        key: IdentityKey,
        now: &Value,
        summary: &mut Summary,
    ) -> (NodeId, bool) {
        let identity = (label.to_owned(), key);
        if let Some(&node) = self.by_identity.get(&identity).and_then(|nodes| nodes.first()) {
            return (node, false);
        }
        let node = self.next_node;
        self.next_node += 1;
        let mut data = NodeData::default();
        data.labels.insert(label.to_owned());
        if !now.is_null() {
            data.props.insert(FIRSTSEEN.to_owned(), now.clone());
        }
        self.nodes.insert(node, data);
        self.by_label
            .entry(label.to_owned())
            .or_default()
            .insert(node);
        self.by_identity.entry(identity).or_default().insert(node);
        summary.nodes_created += 1;
        (node, true)
    }

    fn add_label(&mut self, node: NodeId, label: &str, summary: &mut Summary) {
        let Some(data) = self.nodes.get_mut(&node) else {
            return;
        };
        if !data.labels.insert(label.to_owned()) {
            return;
        }
        summary.labels_added += 1;
        if let Some(key) = data.props.get("id").and_then(Value::identity_key) {
            self.by_identity
                .entry((label.to_owned(), key))
                .or_default()
                .insert(node);
        }
        self.by_label
            .entry(label.to_owned())
            .or_default()
            .insert(node);
    }

    /// Nodes of the relationship's target label matched by its matcher.
    fn match_targets(&self, rel: &RelSchema, record: &Record, params: &Parameters) -> Vec<NodeId> {
        let mut criteria = Vec::new();
        for (attribute, prop) in rel.target_node_matcher().iter() {
            let value = lookup(prop, record, params);
            if value.is_null() {
                return Vec::new();
            }
            criteria.push((attribute, value, prop.is_ignore_case()));
        }
        let label = rel.target_node_label();
        if let [("id", value, false)] = criteria.as_slice() {
            return value
                .identity_key()
                .and_then(|key| self.by_identity.get(&(label.to_owned(), key)))
                .map(|nodes| nodes.iter().copied().collect())
                .unwrap_or_default();
        }
        self.label_members(label)
            .filter(|node| {
                let Some(data) = self.nodes.get(node) else {
                    return false;
                };
                criteria.iter().all(|(attribute, value, ignore_case)| {
                    data.props.get(*attribute).is_some_and(|stored| {
                        if *ignore_case {
                            stored.graph_eq_ignore_case(value)
                        } else {
                            stored.graph_eq(value)
                        }
                    })
                })
            })
            .collect()
    }

    fn merge_relationships(
        &mut self,
        node: NodeId,
        rel: &RelSchema,
        record: &Record,
        params: &Parameters,
        now: &Value,
        summary: &mut Summary,
    ) {
        for target in self.match_targets(rel, record, params) {
            let (from, to) = match rel.direction() {
                LinkDirection::Outward => (node, target),
                LinkDirection::Inward => (target, node),
            };
            let key = (from, to, rel.rel_label().to_owned());
            let (edge, created) = match self.edge_keys.get(&key) {
                Some(&edge) => (edge, false),
                None => (self.create_edge(key, now), true),
            };
            if created {
                summary.relationships_created += 1;
            }
            if let Some(data) = self.edges.get_mut(&edge) {
                apply_properties(
                    &mut data.props,
                    rel.properties(),
                    None,
                    record,
                    params,
                    created,
                    summary,
                );
            }
        }
    }

    fn create_edge(&mut self, key: (NodeId, NodeId, String), now: &Value) -> EdgeId {
        let edge = self.next_edge;
        self.next_edge += 1;
        let (from, to, rel_type) = key.clone();
        let mut props = Record::new();
        if !now.is_null() {
            props.insert(FIRSTSEEN.to_owned(), now.clone());
        }
        self.edges.insert(
            edge,
            EdgeData {
                rel_type,
                from,
                to,
                props,
            },
        );
        self.outgoing.entry(from).or_default().push(edge);
        self.incoming.entry(to).or_default().push(edge);
        self.edge_keys.insert(key, edge);
        edge
    }

    fn delete_edge(&mut self, edge: EdgeId) -> bool {
        let Some(data) = self.edges.remove(&edge) else {
            return false;
        };
        if let Some(list) = self.outgoing.get_mut(&data.from) {
            list.retain(|e| *e != edge);
        }
        if let Some(list) = self.incoming.get_mut(&data.to) {
            list.retain(|e| *e != edge);
        }
        self.edge_keys.remove(&(data.from, data.to, data.rel_type));
        true
    }

    fn detach_delete(&mut self, node: NodeId, summary: &mut Summary) {
        let attached: Vec<EdgeId> = self
            .outgoing
            .get(&node)
            .into_iter()
            .chain(self.incoming.get(&node))
            .flat_map(|list| list.iter().copied())
            .collect();
        for edge in attached {
            if self.delete_edge(edge) {
                summary.relationships_deleted += 1;
            }
        }
        self.outgoing.remove(&node);
        self.incoming.remove(&node);
        let Some(data) = self.nodes.remove(&node) else {
            return;
        };
        let key = data.props.get("id").and_then(Value::identity_key);
        for label in &data.labels {
            if let Some(members) = self.by_label.get_mut(label) {
                members.remove(&node);
            }
            if let Some(key) = &key {
                let identity = (label.clone(), key.clone());
                if let Some(nodes) = self.by_identity.get_mut(&identity) {
                    nodes.remove(&node);
                    if nodes.is_empty() {
                        self.by_identity.remove(&identity);
                    }
                }
            }
        }
        summary.nodes_deleted += 1;
    }

    /// Edges of `rel_type` touching `node` in `direction`, whose other end carries `label`.
    fn edges_towards(
        &self,
        node: NodeId,
        rel_type: &str,
        direction: LinkDirection,
        label: &str,
    ) -> Vec<(EdgeId, NodeId)> {
        let list = match direction {
            LinkDirection::Outward => self.outgoing.get(&node),
            LinkDirection::Inward => self.incoming.get(&node),
        };
        list.into_iter()
            .flat_map(|list| list.iter())
            .filter_map(|edge| {
                let data = self.edges.get(edge)?;
                let other = match direction {
                    LinkDirection::Outward => data.to,
                    LinkDirection::Inward => data.from,
                };
                let carries_label = self
                    .nodes
                    .get(&other)
                    .is_some_and(|n| n.labels.contains(label));
                (data.rel_type == rel_type && carries_label).then_some((*edge, other))
            })
            .collect()
    }

    fn cleanup(&mut self, plan: &CleanupPlan, params: &Parameters) -> Result<Summary, StoreError> {
        let tag = params.get(UPDATE_TAG).unwrap_or(&NULL);
        let limit = params
            .get(LIMIT_SIZE)
            .and_then(Value::as_int)
            .and_then(|limit| usize::try_from(limit).ok())
            .ok_or_else(|| {
                StoreError::Rejected("LIMIT_SIZE must be a non-negative integer".into())
            })?;

        // `(n:Label)<-[s]-(sub)` seen from the sub resource is the opposite direction.
        let sub = &plan.sub_resource;
        let towards_owned = match sub.direction() {
            LinkDirection::Inward => LinkDirection::Outward,
            LinkDirection::Outward => LinkDirection::Inward,
        };
        let mut owned: BTreeSet<(NodeId, EdgeId)> = BTreeSet::new();
        for sub_node in self.match_targets(sub, &Record::new(), params) {
            let edges = self.edges_towards(sub_node, sub.rel_label(), towards_owned, &plan.label);
            owned.extend(edges.into_iter().map(|(edge, node)| (node, edge)));
        }

        let mut summary = Summary::default();
        match &plan.target {
            CleanupTarget::StaleNodes => {
                let stale: BTreeSet<NodeId> = owned
                    .iter()
                    .map(|(node, _)| *node)
                    .filter(|node| self.nodes.get(node).is_some_and(|n| is_stale(&n.props, tag)))
                    .collect();
                for node in stale.into_iter().take(limit) {
                    self.detach_delete(node, &mut summary);
                    summary.total_completed += 1;
                }
            }
            CleanupTarget::StaleSubResourceRels => {
                let stale: Vec<EdgeId> = owned
                    .iter()
                    .map(|(_, edge)| *edge)
                    .filter(|edge| self.edges.get(edge).is_some_and(|e| is_stale(&e.props, tag)))
                    .take(limit)
                    .collect();
                for edge in stale {
                    if self.delete_edge(edge) {
                        summary.relationships_deleted += 1;
                        summary.total_completed += 1;
                    }
                }
            }
            CleanupTarget::StaleRels(rel) => {
                let nodes: BTreeSet<NodeId> = owned.iter().map(|(node, _)| *node).collect();
                let stale: BTreeSet<EdgeId> = nodes
                    .into_iter()
                    .flat_map(|node| {
                        self.edges_towards(
                            node,
                            rel.rel_label(),
                            rel.direction(),
                            rel.target_node_label(),
                        )
                    })
                    .map(|(edge, _)| edge)
                    .filter(|edge| self.edges.get(edge).is_some_and(|e| is_stale(&e.props, tag)))
                    .collect();
                for edge in stale.into_iter().take(limit) {
                    if self.delete_edge(edge) {
                        summary.relationships_deleted += 1;
                        summary.total_completed += 1;
                    }
                }
            }
        }
        Ok(summary)
    }
}
