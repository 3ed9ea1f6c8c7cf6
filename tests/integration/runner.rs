#![allow(missing_docs)]
#![allow(clippy::field_reassign_with_default)]

use std::sync::Arc;

use graphsync::config::SyncConfig;
use graphsync::stats::CounterStats;
use graphsync::storage::Fault;
use graphsync::sync::EntityLoad;
use graphsync::{
    record, GraphSync, LinkDirection, MemoryGraph, NodeSchema, PropertyRef, RelSchema,
    RunParams, StoreError, SyncError, SyncRunner, SyncTarget, SyncUnit, Value,
};

fn scoped(label: &str) -> Arc<NodeSchema> {
    Arc::new(
        NodeSchema::builder(label)
            .property("id", PropertyRef::new("id"))
            .property("lastupdated", PropertyRef::run_param("lastupdated"))
            .sub_resource(
                RelSchema::new("Tenant", "RESOURCE", LinkDirection::Inward)
                    .matching("id", PropertyRef::run_param("TENANT_ID"))
                    .property("lastupdated", PropertyRef::run_param("lastupdated")),
            )
            .build()
            .expect("valid schema"),
    )
}

fn seeded(tenants: &[&str]) -> MemoryGraph {
    let graph = MemoryGraph::new();
    for tenant in tenants {
        graph
            .insert_node(&["Tenant"], record! { "id" => *tenant })
            .expect("seed tenant");
    }
    graph
}

fn unit(tenant: &str, tag: i64, users: &[&str], groups: &[&str]) -> SyncUnit {
    let records = |ids: &[&str]| ids.iter().map(|id| record! { "id" => *id }).collect();
    SyncUnit::new(tenant, RunParams::new(tag).with("TENANT_ID", tenant))
        .entity(EntityLoad::new(scoped("User"), records(users)))
        .entity(EntityLoad::new(scoped("Group"), records(groups)))
        .record_metadata(SyncTarget::new("Tenant", tenant, "Directory"))
}

#[test]
fn units_run_in_parallel_and_report_in_order() {
    let tenants = ["t1", "t2", "t3", "t4", "t5"];
    let counters = Arc::new(CounterStats::new());
    let sync = GraphSync::new(seeded(&tenants), SyncConfig::default()).with_stats(counters.clone());

    let units = tenants
        .iter()
        .map(|tenant| {
            let user = format!("{tenant}-u");
            let group = format!("{tenant}-g");
            unit(tenant, 10, &[user.as_str()], &[group.as_str()])
        })
        .collect();
    let reports = SyncRunner::new(&sync).max_workers(3).run(units);

    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, tenants);
    for report in &reports {
        assert!(report.is_success(), "{}: {:?}", report.name, report.error);
        assert_eq!(report.loads.len(), 2);
        assert_eq!(report.sweeps.len(), 2);
        assert!(report.metadata_recorded);
    }
    let graph = sync.session();
    assert_eq!(graph.node_count("User"), 5);
    assert_eq!(graph.node_count("Group"), 5);
    assert_eq!(graph.node_count("ModuleSyncMetadata"), 5);
    assert_eq!(counters.counter("Tenant_t3_Directory_lastupdated"), 10);
}

#[test]
fn failed_load_skips_sweep_and_metadata() {
    let sync = GraphSync::new(seeded(&["good", "bad"]), SyncConfig::default());
    let first = SyncRunner::new(&sync).run(vec![
        unit("good", 1, &["g-old"], &["g-grp"]),
        unit("bad", 1, &["b-old"], &["b-grp"]),
    ]);
    assert!(first.iter().all(|r| r.is_success()));

    sync.session().inject(
        Fault::new(StoreError::Unavailable("connection reset".into())).on_label("Group"),
    );
    let reports = SyncRunner::new(&sync).max_workers(1).run(vec![
        unit("bad", 2, &["b-new"], &["b-grp"]),
        unit("good", 2, &["g-new"], &["g-grp"]),
    ]);

    let bad = &reports[0];
    assert!(!bad.is_success());
    assert_eq!(bad.loads.len(), 1, "users loaded before the failure");
    assert!(bad.sweeps.is_empty());
    assert!(!bad.metadata_recorded);
    let err = bad.error.as_ref().expect("bad unit failed");
    assert!(err.is_transient());
    match err {
        SyncError::PartialBatch {
            label,
            batch_index,
            committed,
            ..
        } => {
            assert_eq!(label, "Group");
            assert_eq!(*batch_index, 0);
            assert_eq!(*committed, 0);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let good = &reports[1];
    assert!(good.is_success());
    assert!(good.metadata_recorded);

    let graph = sync.session();
    assert!(graph.node("User", "b-old").is_some(), "failed unit not swept");
    assert!(graph.node("User", "b-new").is_some());
    assert!(graph.node("User", "g-old").is_none(), "healthy unit swept");
    let bad_meta = graph
        .node("ModuleSyncMetadata", "Tenant_bad_Directory")
        .expect("metadata from first run");
    assert_eq!(bad_meta.get("lastupdated"), Some(&Value::Int(1)));
    let good_meta = graph
        .node("ModuleSyncMetadata", "Tenant_good_Directory")
        .expect("metadata");
    assert_eq!(good_meta.get("lastupdated"), Some(&Value::Int(2)));
}

#[test]
fn retrying_engine_rides_out_transient_faults() {
    let mut config = SyncConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    let sync = GraphSync::with_retry(seeded(&["t1"]), config);
    sync.session()
        .inner()
        .inject(Fault::new(StoreError::Transient("deadlock".into())).times(2));

    let reports = SyncRunner::new(&sync).run(vec![unit("t1", 5, &["u1"], &["g1"])]);
    assert!(reports[0].is_success(), "{:?}", reports[0].error);
    assert!(sync.session().inner().node("User", "u1").is_some());
}
