#![forbid(unsafe_code)]

//! Statement compiler.
//!
//! Everything here is pure: schemas go in, [`Statement`]s come out. Nothing
//! in this module talks to a store.

/// Batched upsert compilation.
///
/// Renders one `UNWIND`/`MERGE` statement per schema and relationship selection.
pub mod builder;

/// Sub-resource scoped staleness cleanup.
pub mod cleanup;

/// Schema and compilation errors.
pub mod errors;

/// Index statements derived from a schema.
pub mod index;

/// Compiled statement representation shared by every store.
pub mod statement;

/// Property values carried by input records and run parameters.
pub mod value;

pub use builder::{build_ingestion_query, RelSelection};
pub use cleanup::build_cleanup_queries;
pub use errors::{SchemaError, SchemaErrorWithCode};
pub use index::build_create_index_queries;
pub use statement::{
    CleanupPlan, CleanupTarget, Operation, Parameters, Statement, UpsertPlan, DICT_LIST,
    LASTUPDATED, LIMIT_SIZE, UPDATE_TAG,
};
pub use value::{IdentityKey, Record, Value};
