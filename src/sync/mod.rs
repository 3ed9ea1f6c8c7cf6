#![forbid(unsafe_code)]

//! Ingestion, sweep and run bookkeeping.
//!
//! [`GraphSync`] is the entry point collectors use: it compiles schemas (with
//! caching), loads record batches, sweeps stale data and records run metadata.
//! [`SyncRunner`] drives many sub resources in parallel on top of it.

mod engine;
mod job;
mod loader;
mod metadata;
mod params;
mod runner;

pub use engine::GraphSync;
pub use job::{GraphJob, JobStatement, SweepReport};
pub use loader::{load_batches, LoadReport};
pub use metadata::{
    sync_metadata_schema, SyncTarget, SYNC_METADATA_EXTRA_LABEL, SYNC_METADATA_LABEL,
};
pub use params::RunParams;
pub use runner::{EntityLoad, SyncRunner, SyncUnit, UnitReport};
