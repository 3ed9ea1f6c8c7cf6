#![forbid(unsafe_code)]

//! Backing stores.
//!
//! The engine only needs one capability from a store: run a compiled
//! [`Statement`] with its [`Parameters`] and report what changed. That is the
//! [`GraphSession`] trait. [`MemoryGraph`] is the in-process implementation
//! and [`Retrying`] decorates any session with transient-error retries.

use serde::Serialize;
use thiserror::Error;

use crate::query::{Parameters, Statement};

/// In-process property graph.
pub mod memory;

mod retry;

pub use memory::{Fault, MemoryGraph, NodeView, RelView};
pub use retry::{RetryPolicy, Retrying};

/// Errors reported by a backing store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The statement may succeed if re-run (deadlock, lock timeout, leader switch).
    #[error("transient store error: {0}")]
    Transient(String),
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store refused the statement; re-running it will fail again.
    #[error("statement rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether re-running the same statement may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Unavailable(_))
    }

    /// Machine-readable code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Transient(_) => "Transient",
            StoreError::Unavailable(_) => "Unavailable",
            StoreError::Rejected(_) => "Rejected",
        }
    }
}

/// Counters describing what one statement changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Nodes created.
    pub nodes_created: u64,
    /// Nodes deleted.
    pub nodes_deleted: u64,
    /// Relationships created.
    pub relationships_created: u64,
    /// Relationships deleted, including those removed by detaching nodes.
    pub relationships_deleted: u64,
    /// Attributes written or removed.
    pub properties_set: u64,
    /// Labels added to existing or new nodes beyond the primary one.
    pub labels_added: u64,
    /// Indexes that did not exist before.
    pub indexes_added: u64,
    /// Value of `TotalCompleted` for cleanup statements.
    pub total_completed: u64,
}

impl Summary {
    /// Adds another summary's counters to this one.
    pub fn absorb(&mut self, other: &Summary) {
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
        self.indexes_added += other.indexes_added;
        self.total_completed += other.total_completed;
    }

    /// Whether the statement changed anything.
    pub fn contains_updates(&self) -> bool {
        self.nodes_created
            + self.nodes_deleted
            + self.relationships_created
            + self.relationships_deleted
            + self.properties_set
            + self.labels_added
            + self.indexes_added
            > 0
    }
}

/// Milliseconds since the Unix epoch, the unit of `timestamp()`.
pub(crate) fn unix_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// A connection to a backing store able to run compiled statements.
///
/// Each call is one synchronous round-trip and one transaction: either the
/// whole statement applies or none of it does.
pub trait GraphSession: Send + Sync {
    /// Runs `statement` with `params`.
    fn run(&self, statement: &Statement, params: &Parameters) -> Result<Summary, StoreError>;
}

impl<S: GraphSession + ?Sized> GraphSession for &S {
    fn run(&self, statement: &Statement, params: &Parameters) -> Result<Summary, StoreError> {
        (**self).run(statement, params)
    }
}

impl<S: GraphSession + ?Sized> GraphSession for std::sync::Arc<S> {
    fn run(&self, statement: &Statement, params: &Parameters) -> Result<Summary, StoreError> {
        (**self).run(statement, params)
    }
}

impl<S: GraphSession + ?Sized> GraphSession for Box<S> {
    fn run(&self, statement: &Statement, params: &Parameters) -> Result<Summary, StoreError> {
        (**self).run(statement, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Transient("deadlock".into()).is_transient());
        assert!(StoreError::Unavailable("connection refused".into()).is_transient());
        assert!(!StoreError::Rejected("syntax".into()).is_transient());
    }

    #[test]
    fn summary_absorb() {
        let mut total = Summary::default();
        assert!(!total.contains_updates());
        total.absorb(&Summary {
            nodes_created: 2,
            properties_set: 6,
            ..Summary::default()
        });
        total.absorb(&Summary {
            nodes_deleted: 1,
            total_completed: 1,
            ..Summary::default()
        });
        assert_eq!(total.nodes_created, 2);
        assert_eq!(total.nodes_deleted, 1);
        assert_eq!(total.total_completed, 1);
        assert!(total.contains_updates());
    }
}
