#![allow(missing_docs)]

use graphsync::config::SyncConfig;
use graphsync::query::SchemaError;
use graphsync::{
    record, GraphSync, LinkDirection, MemoryGraph, NodeSchema, PropertyRef, RelSchema,
    RelSelection, RunParams, SyncError, Value,
};

fn instance_schema() -> NodeSchema {
    NodeSchema::builder("Instance")
        .property("id", PropertyRef::new("InstanceId"))
        .property("lastupdated", PropertyRef::run_param("lastupdated"))
        .property("region", PropertyRef::new("Region"))
        .sub_resource(
            RelSchema::new("Account", "RESOURCE", LinkDirection::Inward)
                .matching("id", PropertyRef::run_param("ACCOUNT_ID"))
                .property("lastupdated", PropertyRef::run_param("lastupdated")),
        )
        .relationship(
            RelSchema::new("Subnet", "PART_OF_SUBNET", LinkDirection::Outward)
                .matching("id", PropertyRef::new("SubnetId"))
                .property("lastupdated", PropertyRef::run_param("lastupdated")),
        )
        .build()
        .expect("valid schema")
}

fn engine() -> GraphSync<MemoryGraph> {
    let graph = MemoryGraph::new();
    for account in ["X", "Y"] {
        graph
            .insert_node(&["Account"], record! { "id" => account })
            .expect("seed account");
    }
    graph
        .insert_node(&["Subnet"], record! { "id" => "subnet-1" })
        .expect("seed subnet");
    GraphSync::new(graph, SyncConfig::default())
}

fn params(tag: i64, account: &str) -> RunParams {
    RunParams::new(tag).with("ACCOUNT_ID", account)
}

#[test]
fn sweep_leaves_other_sub_resources_alone() {
    let sync = engine();
    let schema = instance_schema();
    sync.load(
        &schema,
        &[
            record! { "InstanceId" => "x1" },
            record! { "InstanceId" => "x2" },
        ],
        &RelSelection::All,
        &params(1, "X"),
    )
    .expect("load X");
    sync.load(
        &schema,
        &[
            record! { "InstanceId" => "y1" },
            record! { "InstanceId" => "y2" },
        ],
        &RelSelection::All,
        &params(1, "Y"),
    )
    .expect("load Y");

    sync.load(
        &schema,
        &[record! { "InstanceId" => "x1" }],
        &RelSelection::All,
        &params(2, "X"),
    )
    .expect("reload X");
    let report = sync.sweep(&schema, &params(2, "X")).expect("sweep X");

    let graph = sync.session();
    assert_eq!(report.job, "Cleanup Instance");
    assert_eq!(report.summary.nodes_deleted, 1);
    assert!(graph.node("Instance", "x1").is_some());
    assert!(graph.node("Instance", "x2").is_none());
    for id in ["y1", "y2"] {
        let node = graph.node("Instance", id).expect("Y entity kept");
        assert_eq!(node.get("lastupdated"), Some(&Value::Int(1)));
    }
}

#[test]
fn sweep_drops_relationships_not_seen_this_run() {
    let sync = engine();
    let schema = instance_schema();
    sync.load(
        &schema,
        &[record! { "InstanceId" => "x1", "SubnetId" => "subnet-1" }],
        &RelSelection::All,
        &params(1, "X"),
    )
    .expect("load with subnet");
    assert_eq!(sync.session().relationship_count("PART_OF_SUBNET"), 1);

    sync.load(
        &schema,
        &[record! { "InstanceId" => "x1" }],
        &RelSelection::All,
        &params(2, "X"),
    )
    .expect("load without subnet");
    let report = sync.sweep(&schema, &params(2, "X")).expect("sweep");

    let graph = sync.session();
    assert_eq!(report.summary.nodes_deleted, 0);
    assert_eq!(report.summary.relationships_deleted, 1);
    assert_eq!(graph.relationship_count("PART_OF_SUBNET"), 0);
    assert!(graph.node("Subnet", "subnet-1").is_some(), "target node kept");
    assert!(graph
        .relationship(("Account", "X"), "RESOURCE", ("Instance", "x1"))
        .is_some());
}

#[test]
fn small_iterations_still_sweep_everything() {
    let config = SyncConfig {
        cleanup_iteration_size: 2,
        ..SyncConfig::default()
    };
    let graph = MemoryGraph::new();
    graph
        .insert_node(&["Account"], record! { "id" => "X" })
        .expect("seed account");
    let sync = GraphSync::new(graph, config);
    let schema = instance_schema();
    let records: Vec<_> = (0..7)
        .map(|i| record! { "InstanceId" => format!("i-{i}") })
        .collect();
    sync.load(&schema, &records, &RelSelection::All, &params(1, "X"))
        .expect("load");

    let report = sync.sweep(&schema, &params(2, "X")).expect("sweep");
    assert_eq!(report.summary.nodes_deleted, 7);
    assert_eq!(sync.session().node_count("Instance"), 0);
    assert!(report.iterations >= 4);
}

#[test]
fn sweep_requires_the_sub_resource_parameter() {
    let sync = engine();
    let err = sync
        .sweep(&instance_schema(), &RunParams::new(2))
        .expect_err("missing ACCOUNT_ID");
    match err {
        SyncError::MissingRunParameter { label, name } => {
            assert_eq!(label, "Instance");
            assert_eq!(name, "ACCOUNT_ID");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unscoped_schemas_cannot_be_swept() {
    let schema = NodeSchema::builder("Global")
        .property("id", PropertyRef::new("id"))
        .property("lastupdated", PropertyRef::run_param("lastupdated"))
        .build()
        .expect("valid schema");
    let err = engine()
        .sweep(&schema, &RunParams::new(1))
        .expect_err("no sub resource");
    assert!(matches!(
        err,
        SyncError::Schema(SchemaError::MissingSubResource { .. })
    ));
    assert_eq!(err.code(), "MissingSubResource");
}

#[test]
fn untagged_owned_nodes_are_swept() {
    let sync = engine();
    let schema = instance_schema();
    let graph = sync.session();
    graph
        .insert_node(&["Instance"], record! { "id" => "legacy" })
        .expect("seed untagged instance");
    graph
        .insert_relationship(("Account", "X"), "RESOURCE", ("Instance", "legacy"), record! {})
        .expect("seed ownership");
    assert!(graph
        .node("Instance", "legacy")
        .is_some_and(|node| node.get("lastupdated").is_none()));

    sync.load(
        &schema,
        &[record! { "InstanceId" => "x1" }],
        &RelSelection::All,
        &params(5, "X"),
    )
    .expect("load X");
    let report = sync.sweep(&schema, &params(5, "X")).expect("sweep X");

    assert_eq!(report.summary.nodes_deleted, 1);
    assert!(graph.node("Instance", "legacy").is_none());
    assert!(graph.node("Instance", "x1").is_some());
}

#[test]
fn zero_iteration_size_fails_instead_of_skipping() {
    let graph = MemoryGraph::new();
    graph
        .insert_node(&["Account"], record! { "id" => "X" })
        .expect("seed account");
    let config = SyncConfig {
        cleanup_iteration_size: 0,
        ..SyncConfig::default()
    };
    let sync = GraphSync::new(graph, config);
    let schema = instance_schema();
    sync.load(
        &schema,
        &[record! { "InstanceId" => "x1" }],
        &RelSelection::All,
        &params(1, "X"),
    )
    .expect("load X");

    let err = sync
        .sweep(&schema, &params(2, "X"))
        .expect_err("zero LIMIT_SIZE cannot sweep");
    assert_eq!(err.code(), "Config");
    assert!(sync.session().node("Instance", "x1").is_some());
}
