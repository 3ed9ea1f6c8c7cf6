//! Run metadata.
//!
//! After a collector finishes a sub resource it stamps a `ModuleSyncMetadata`
//! node so that downstream jobs can tell when each data source last synced.

use tracing::info;

use super::params::RunParams;
use crate::model::{NodeSchema, PropertyRef};
use crate::query::{Record, SchemaError, Value};
use crate::storage::unix_millis;

/// Primary label of run metadata nodes.
pub const SYNC_METADATA_LABEL: &str = "ModuleSyncMetadata";
/// Extra label of run metadata nodes.
pub const SYNC_METADATA_EXTRA_LABEL: &str = "SyncMetadata";

/// Identifies which data source a run synced.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SyncTarget {
    /// Kind of the owning group, e.g. `AWSAccount`.
    pub group_type: String,
    /// Id of the owning group.
    pub group_id: String,
    /// Kind of data synced, e.g. `S3Bucket`.
    pub synced_type: String,
}

impl SyncTarget {
    /// Bundles the three identifying parts.
    pub fn new(
        group_type: impl Into<String>,
        group_id: impl Into<String>,
        synced_type: impl Into<String>,
    ) -> Self {
        Self {
            group_type: group_type.into(),
            group_id: group_id.into(),
            synced_type: synced_type.into(),
        }
    }

    /// `{group_type}_{group_id}_{synced_type}`.
    pub fn node_id(&self) -> String {
        format!("{}_{}_{}", self.group_type, self.group_id, self.synced_type)
    }

    /// Counter incremented by the run tag.
    pub fn stat_key(&self) -> String {
        format!("{}_lastupdated", self.node_id())
    }

    pub(crate) fn record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id".to_owned(), Value::from(self.node_id()));
        record.insert("grouptype".to_owned(), Value::from(self.group_type.as_str()));
        record.insert("groupid".to_owned(), Value::from(self.group_id.as_str()));
        record.insert("syncedtype".to_owned(), Value::from(self.synced_type.as_str()));
        record.insert("syncedat".to_owned(), Value::Int(unix_millis()));
        record
    }
}

/// Schema of `ModuleSyncMetadata` nodes.
pub fn sync_metadata_schema() -> Result<NodeSchema, SchemaError> {
    NodeSchema::builder(SYNC_METADATA_LABEL)
        .extra_label(SYNC_METADATA_EXTRA_LABEL)
        .property("id", PropertyRef::record("id"))
        .property("lastupdated", PropertyRef::run_param("lastupdated"))
        .property("grouptype", PropertyRef::record("grouptype"))
        .property("groupid", PropertyRef::record("groupid"))
        .property("syncedtype", PropertyRef::record("syncedtype"))
        .property("syncedat", PropertyRef::record("syncedat"))
        .build()
}

pub(crate) fn log_recorded(target: &SyncTarget, run_params: &RunParams) {
    info!(
        id = %target.node_id(),
        update_tag = run_params.update_tag(),
        "sync.metadata.recorded"
    );
}
