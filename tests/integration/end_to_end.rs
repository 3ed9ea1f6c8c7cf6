#![allow(missing_docs)]

use graphsync::config::SyncConfig;
use graphsync::query::build_create_index_queries;
use graphsync::storage::GraphSession;
use graphsync::{
    record, GraphSync, LinkDirection, MemoryGraph, NodeSchema, PropertyRef, RelSchema,
    RelSelection, RunParams, Value,
};

fn item_schema() -> NodeSchema {
    NodeSchema::builder("Item")
        .extra_label("Asset")
        .property("id", PropertyRef::new("id"))
        .property("lastupdated", PropertyRef::run_param("lastupdated"))
        .property("val", PropertyRef::new("val"))
        .property("name", PropertyRef::new("name").extra_index())
        .sub_resource(
            RelSchema::new("SubResource", "RESOURCE", LinkDirection::Inward)
                .matching("id", PropertyRef::run_param("sub_resource_id"))
                .property("lastupdated", PropertyRef::run_param("lastupdated")),
        )
        .relationship(
            RelSchema::new("Owner", "OWNED_BY", LinkDirection::Outward)
                .matching("email", PropertyRef::new("owner_email").ignore_case())
                .property("lastupdated", PropertyRef::run_param("lastupdated")),
        )
        .build()
        .expect("valid schema")
}

fn engine() -> GraphSync<MemoryGraph> {
    let graph = MemoryGraph::new();
    graph
        .insert_node(&["SubResource"], record! { "id" => "S" })
        .expect("seed sub resource");
    GraphSync::new(graph, SyncConfig::default())
}

fn params(tag: i64) -> RunParams {
    RunParams::new(tag).with("sub_resource_id", "S")
}

#[test]
fn tagged_runs_update_then_sweep() {
    let sync = engine();
    let schema = item_schema();

    sync.load(
        &schema,
        &[record! { "id" => "a", "val" => 1 }],
        &RelSelection::All,
        &params(100),
    )
    .expect("load at 100");
    let graph = sync.session();
    assert_eq!(graph.node_count("Item"), 1);
    let a = graph.node("Item", "a").expect("a exists");
    assert_eq!(a.get("val"), Some(&Value::Int(1)));
    assert_eq!(a.get("lastupdated"), Some(&Value::Int(100)));
    assert!(a.has_label("Asset"));
    assert!(graph
        .relationship(("SubResource", "S"), "RESOURCE", ("Item", "a"))
        .is_some());

    sync.load(
        &schema,
        &[
            record! { "id" => "a", "val" => 2 },
            record! { "id" => "b", "val" => 9 },
        ],
        &RelSelection::All,
        &params(200),
    )
    .expect("load at 200");
    let sweep = sync.sweep(&schema, &params(200)).expect("sweep at 200");
    assert_eq!(sweep.summary.nodes_deleted, 0);
    assert_eq!(graph.node_count("Item"), 2);
    let a = graph.node("Item", "a").expect("a kept");
    assert_eq!(a.get("val"), Some(&Value::Int(2)));
    assert_eq!(a.get("lastupdated"), Some(&Value::Int(200)));
    let b = graph.node("Item", "b").expect("b created");
    assert_eq!(b.get("val"), Some(&Value::Int(9)));
    assert_eq!(b.get("lastupdated"), Some(&Value::Int(200)));

    sync.load(
        &schema,
        &[record! { "id" => "b", "val" => 9 }],
        &RelSelection::All,
        &params(300),
    )
    .expect("load at 300");
    let sweep = sync.sweep(&schema, &params(300)).expect("sweep at 300");
    assert_eq!(sweep.summary.nodes_deleted, 1);
    assert!(graph.node("Item", "a").is_none());
    assert_eq!(
        graph.node("Item", "b").and_then(|b| b.get("lastupdated").cloned()),
        Some(Value::Int(300))
    );
    assert_eq!(graph.relationship_count("RESOURCE"), 1);
}

#[test]
fn loading_twice_is_idempotent() {
    let sync = engine();
    let schema = item_schema();
    sync.session()
        .insert_node(&["Owner"], record! { "id" => "o1", "email" => "Ops@Example.com" })
        .expect("seed owner");
    let records = [
        record! { "id" => "a", "val" => 1, "owner_email" => "ops@example.com" },
        record! { "id" => "b", "val" => 2, "name" => "bee" },
    ];

    sync.load(&schema, &records, &RelSelection::All, &params(7))
        .expect("first load");
    let graph = sync.session();
    let first_nodes = graph.nodes("Item");
    let first_rels = (
        graph.relationship_count("RESOURCE"),
        graph.relationship_count("OWNED_BY"),
    );

    let report = sync
        .load(&schema, &records, &RelSelection::All, &params(7))
        .expect("second load");
    assert_eq!(report.summary.nodes_created, 0);
    assert_eq!(report.summary.relationships_created, 0);
    assert_eq!(graph.nodes("Item"), first_nodes);
    assert_eq!(
        (
            graph.relationship_count("RESOURCE"),
            graph.relationship_count("OWNED_BY"),
        ),
        first_rels
    );
    assert_eq!(first_rels, (2, 1));
}

#[test]
fn missing_record_values_keep_stored_attributes() {
    let sync = engine();
    let schema = item_schema();

    sync.load(
        &schema,
        &[record! { "id" => "a", "val" => 1, "name" => "first" }],
        &RelSelection::All,
        &params(1),
    )
    .expect("load at 1");
    sync.load(
        &schema,
        &[record! { "id" => "a", "val" => 5 }],
        &RelSelection::All,
        &params(2),
    )
    .expect("load at 2");

    let a = sync.session().node("Item", "a").expect("a exists");
    assert_eq!(a.get("val"), Some(&Value::Int(5)));
    assert_eq!(a.get("name"), Some(&Value::from("first")));
    assert_eq!(a.get("lastupdated"), Some(&Value::Int(2)));
    assert!(a.get("firstseen").is_some());
}

#[test]
fn late_batch_never_lowers_the_run_tag() {
    let sync = engine();
    let schema = item_schema();

    sync.load(
        &schema,
        &[record! { "id" => "a", "val" => 1 }],
        &RelSelection::All,
        &params(200),
    )
    .expect("load at 200");
    sync.load(
        &schema,
        &[record! { "id" => "a", "val" => 2 }],
        &RelSelection::All,
        &params(100),
    )
    .expect("late load at 100");

    let graph = sync.session();
    let a = graph.node("Item", "a").expect("a exists");
    assert_eq!(a.get("lastupdated"), Some(&Value::Int(200)));
    assert_eq!(a.get("val"), Some(&Value::Int(2)));
    let owned = graph
        .relationship(("SubResource", "S"), "RESOURCE", ("Item", "a"))
        .expect("ownership");
    assert_eq!(owned.get("lastupdated"), Some(&Value::Int(200)));

    let report = sync.sweep(&schema, &params(200)).expect("sweep at 200");
    assert_eq!(report.summary.nodes_deleted, 0);
    assert!(graph.node("Item", "a").is_some());
}

#[test]
fn every_required_index_is_created() {
    let sync = engine();
    let schema = item_schema();
    let summary = sync.ensure_indexes(&schema).expect("indexes");
    let graph = sync.session();

    for label in ["Item", "Asset", "SubResource", "Owner"] {
        assert!(graph.has_index(label, "id"), "{label}.id indexed");
        assert!(graph.has_index(label, "lastupdated"), "{label}.lastupdated indexed");
    }
    assert!(graph.has_index("Item", "name"));
    assert!(graph.has_index("Asset", "name"));
    assert!(graph.has_index("Owner", "email"));
    assert_eq!(
        summary.indexes_added,
        build_create_index_queries(&schema).len() as u64
    );

    let again = sync.ensure_indexes(&schema).expect("indexes again");
    assert_eq!(again.indexes_added, 0);
}

#[test]
fn statements_run_directly_against_a_session() {
    let sync = engine();
    let schema = item_schema();
    let statement = sync
        .compile(&schema, &RelSelection::none())
        .expect("compile");
    let bound = graphsync::query::Parameters {
        records: vec![record! { "id" => "z" }],
        values: params(3).values().clone(),
    };
    let summary = sync.session().run(&statement, &bound).expect("run");
    assert_eq!(summary.nodes_created, 1);
    assert_eq!(sync.session().relationship_count("RESOURCE"), 0);
}
