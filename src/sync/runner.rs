//! Parallel sync of independent sub resources.
//!
//! Each [`SyncUnit`] covers one sub resource: every entity type is loaded,
//! then swept, then the run metadata is stamped. Units share nothing but the
//! store, so they run on a bounded pool of scoped worker threads.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::engine::GraphSync;
use super::job::SweepReport;
use super::loader::LoadReport;
use super::metadata::SyncTarget;
use super::params::RunParams;
use crate::error::{Result, SyncError};
use crate::model::NodeSchema;
use crate::query::{Record, RelSelection};
use crate::storage::GraphSession;

/// One entity type's records for a unit.
#[derive(Clone, Debug)]
pub struct EntityLoad {
    /// Entity schema.
    pub schema: Arc<NodeSchema>,
    /// Relationships merged with the nodes.
    pub selection: RelSelection,
    /// Records observed in this run.
    pub records: Vec<Record>,
    /// Whether stale data of this type is swept after loading.
    pub sweep: bool,
}

impl EntityLoad {
    /// Loads `records` with every relationship and sweeps afterwards.
    pub fn new(schema: Arc<NodeSchema>, records: Vec<Record>) -> Self {
        Self {
            schema,
            selection: RelSelection::All,
            records,
            sweep: true,
        }
    }

    /// Restricts the merged relationships.
    pub fn selection(mut self, selection: RelSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Loads without sweeping.
    pub fn without_sweep(mut self) -> Self {
        self.sweep = false;
        self
    }
}

/// Everything synced for one sub resource.
#[derive(Clone, Debug)]
pub struct SyncUnit {
    /// Display name, usually the sub resource id.
    pub name: String,
    /// Parameters binding the sub resource and the run tag.
    pub run_params: RunParams,
    /// Entity types in load order.
    pub entities: Vec<EntityLoad>,
    /// Metadata stamped after a successful sweep.
    pub metadata: Option<SyncTarget>,
}

impl SyncUnit {
    /// An empty unit.
    pub fn new(name: impl Into<String>, run_params: RunParams) -> Self {
        Self {
            name: name.into(),
            run_params,
            entities: Vec::new(),
            metadata: None,
        }
    }

    /// Appends an entity type.
    pub fn entity(mut self, load: EntityLoad) -> Self {
        self.entities.push(load);
        self
    }

    /// Stamps `target` after a successful sweep.
    pub fn record_metadata(mut self, target: SyncTarget) -> Self {
        self.metadata = Some(target);
        self
    }
}

/// What happened to one unit.
#[derive(Debug)]
pub struct UnitReport {
    /// Unit name.
    pub name: String,
    /// Completed loads, in order.
    pub loads: Vec<LoadReport>,
    /// Completed sweeps, in order.
    pub sweeps: Vec<SweepReport>,
    /// Whether run metadata was stamped.
    pub metadata_recorded: bool,
    /// First error, if any. A failed load means no sweep and no metadata.
    pub error: Option<SyncError>,
}

impl UnitReport {
    /// Whether the unit completed without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs sync units concurrently against one engine.
pub struct SyncRunner<'a, S> {
    engine: &'a GraphSync<S>,
    max_workers: usize,
}

impl<'a, S: GraphSession> SyncRunner<'a, S> {
    /// Runner using the engine's `max_workers` setting.
    pub fn new(engine: &'a GraphSync<S>) -> Self {
        Self {
            engine,
            max_workers: engine.config().max_workers,
        }
    }

    /// Overrides the worker count.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Runs every unit and returns their reports in input order.
    pub fn run(&self, units: Vec<SyncUnit>) -> Vec<UnitReport> {
        let total = units.len();
        let workers = self.max_workers.clamp(1, total.max(1));
        let queue: Mutex<VecDeque<(usize, SyncUnit)>> =
            Mutex::new(units.into_iter().enumerate().collect());
        let finished: Mutex<Vec<(usize, UnitReport)>> = Mutex::new(Vec::with_capacity(total));
        info!(units = total, workers, "sync.runner.start");

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let Some((idx, unit)) = queue.lock().pop_front() else {
                        break;
                    };
                    let report = self.run_unit(unit);
                    finished.lock().push((idx, report));
                });
            }
        });

        let mut reports = finished.into_inner();
        reports.sort_by_key(|(idx, _)| *idx);
        let failed = reports.iter().filter(|(_, r)| !r.is_success()).count();
        info!(units = total, failed, "sync.runner.finish");
        reports.into_iter().map(|(_, report)| report).collect()
    }

    fn run_unit(&self, unit: SyncUnit) -> UnitReport {
        let mut report = UnitReport {
            name: unit.name.clone(),
            loads: Vec::new(),
            sweeps: Vec::new(),
            metadata_recorded: false,
            error: None,
        };
        if let Err(error) = self.drive(&unit, &mut report) {
            warn!(unit = %unit.name, code = error.code(), error = %error, "sync.runner.unit_failed");
            report.error = Some(error);
        }
        report
    }

    fn drive(&self, unit: &SyncUnit, report: &mut UnitReport) -> Result<()> {
        for load in &unit.entities {
            let loaded = self.engine.load(
                &load.schema,
                &load.records,
                &load.selection,
                &unit.run_params,
            )?;
            report.loads.push(loaded);
        }
        for load in unit.entities.iter().filter(|load| load.sweep) {
            report
                .sweeps
                .push(self.engine.sweep(&load.schema, &unit.run_params)?);
        }
        if let Some(target) = &unit.metadata {
            self.engine
                .record_run_metadata(target, unit.run_params.update_tag())?;
            report.metadata_recorded = true;
        }
        Ok(())
    }
}
