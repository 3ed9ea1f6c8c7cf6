//! Batched execution of upsert statements.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use super::params::RunParams;
use crate::error::{Result, SyncError};
use crate::query::{Parameters, Record, Statement};
use crate::stats::ScopedStats;
use crate::storage::{GraphSession, Summary};

/// Outcome of loading one record set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Entity label.
    pub label: String,
    /// Records submitted.
    pub records: usize,
    /// Batches committed.
    pub batches: usize,
    /// Combined store counters.
    pub summary: Summary,
    /// Wall time spent in the store.
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Fails with [`SyncError::MissingRunParameter`] if `statement` reads a
/// parameter `run_params` does not bind.
pub(crate) fn check_parameters(
    label: &str,
    statement: &Statement,
    run_params: &RunParams,
) -> Result<()> {
    match statement.missing_parameters(run_params.values()).next() {
        Some(name) => Err(SyncError::MissingRunParameter {
            label: label.to_owned(),
            name: name.to_owned(),
        }),
        None => Ok(()),
    }
}

/// Runs `statement` once per chunk of `batch_size` records.
///
/// Parameters are checked before the first batch. A failing batch stops the
/// load; batches committed before it stay in the store.
pub fn load_batches<S: GraphSession + ?Sized>(
    session: &S,
    label: &str,
    statement: &Statement,
    records: &[Record],
    run_params: &RunParams,
    batch_size: usize,
    stats: &ScopedStats,
) -> Result<LoadReport> {
    check_parameters(label, statement, run_params)?;
    let mut report = LoadReport {
        label: label.to_owned(),
        records: records.len(),
        ..LoadReport::default()
    };
    let started = Instant::now();
    for (batch_index, chunk) in records.chunks(batch_size.max(1)).enumerate() {
        let params = Parameters {
            records: chunk.to_vec(),
            values: run_params.values().clone(),
        };
        let batch_started = Instant::now();
        let summary = session
            .run(statement, &params)
            .map_err(|source| SyncError::PartialBatch {
                label: label.to_owned(),
                batch_index,
                committed: report.batches,
                source,
            })?;
        debug!(
            label,
            batch_index,
            records = chunk.len(),
            nodes_created = summary.nodes_created,
            "sync.load.batch"
        );
        stats.timing("batch", batch_started.elapsed());
        report.summary.absorb(&summary);
        report.batches += 1;
    }
    report.elapsed = started.elapsed();
    stats.incr("records", i64::try_from(records.len()).unwrap_or(i64::MAX));
    info!(
        label,
        records = report.records,
        batches = report.batches,
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "sync.load"
    );
    Ok(report)
}
