//! Declarative reconciliation of inventory snapshots into a property graph.
//!
//! Collectors describe each entity type with a [`model::NodeSchema`]. The
//! [`query`] compiler turns a schema into idempotent batched upserts, cleanup
//! statements and index statements. [`sync::GraphSync`] runs them against a
//! [`storage::GraphSession`]: records are merged under a run tag, then every
//! entity the run did not touch is swept from the owning sub resource.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod stats;
pub mod storage;
pub mod sync;

pub use config::{ConfigError, SyncConfig};
pub use error::{Result, SyncError};
pub use model::{LinkDirection, NodeSchema, PropertyRef, RelKey, RelSchema, Source};
pub use query::{RelSelection, SchemaError, Value};
pub use storage::{GraphSession, MemoryGraph, StoreError};
pub use sync::{GraphSync, RunParams, SyncRunner, SyncTarget, SyncUnit};
