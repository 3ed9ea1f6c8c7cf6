//! Collector-facing facade.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::job::{GraphJob, SweepReport};
use super::loader::{load_batches, LoadReport};
use super::metadata::{self, SyncTarget};
use super::params::RunParams;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::model::NodeSchema;
use crate::query::{
    build_create_index_queries, build_ingestion_query, Parameters, Record, RelSelection, Statement,
};
use crate::stats::{ScopedStats, StatsSink};
use crate::storage::{GraphSession, Retrying, Summary};

type CacheKey = (NodeSchema, RelSelection);

/// Compiles, loads, sweeps and stamps entity data against one session.
///
/// Compiled upserts are cached per schema and relationship selection, so a
/// collector calling [`GraphSync::load`] for every page of results compiles
/// once.
pub struct GraphSync<S> {
    session: S,
    config: SyncConfig,
    cache: Mutex<LruCache<CacheKey, Arc<Statement>>>,
    stats: ScopedStats,
}

impl<S: GraphSession> GraphSync<Retrying<S>> {
    /// Wraps `session` with the retry policy from `config`.
    pub fn with_retry(session: S, config: SyncConfig) -> Self {
        let retrying = Retrying::new(session, config.retry.clone());
        GraphSync::new(retrying, config)
    }
}

impl<S: GraphSession> GraphSync<S> {
    /// Creates an engine over `session`.
    pub fn new(session: S, config: SyncConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.statement_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            session,
            config,
            cache: Mutex::new(LruCache::new(capacity)),
            stats: ScopedStats::default(),
        }
    }

    /// Sends counters and timings to `sink`.
    pub fn with_stats(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats = ScopedStats::root(sink);
        self
    }

    /// Underlying session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Root stats handle.
    pub fn stats(&self) -> &ScopedStats {
        &self.stats
    }

    /// Compiled upsert for `schema` and `selection`, from cache when possible.
    pub fn compile(&self, schema: &NodeSchema, selection: &RelSelection) -> Result<Arc<Statement>> {
        let key = (schema.clone(), selection.clone());
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(Arc::clone(hit));
        }
        let statement = Arc::new(build_ingestion_query(schema, selection)?);
        debug!(label = schema.label(), "sync.compile");
        self.cache.lock().put(key, Arc::clone(&statement));
        Ok(statement)
    }

    /// Number of compiled statements currently cached.
    pub fn cached_statements(&self) -> usize {
        self.cache.lock().len()
    }

    /// Creates every index the statements of `schema` rely on.
    pub fn ensure_indexes(&self, schema: &NodeSchema) -> Result<Summary> {
        let mut total = Summary::default();
        let params = Parameters::default();
        for statement in build_create_index_queries(schema) {
            let summary = self
                .session
                .run(&statement, &params)
                .map_err(|source| SyncError::Store {
                    label: schema.label().to_owned(),
                    source,
                })?;
            total.absorb(&summary);
        }
        debug!(label = schema.label(), added = total.indexes_added, "sync.indexes");
        Ok(total)
    }

    /// Merges `records` as nodes of `schema` plus the selected relationships.
    pub fn load(
        &self,
        schema: &NodeSchema,
        records: &[Record],
        selection: &RelSelection,
        run_params: &RunParams,
    ) -> Result<LoadReport> {
        let statement = self.compile(schema, selection)?;
        let stats = self.stats.scoped("load").scoped(schema.label());
        load_batches(
            &self.session,
            schema.label(),
            &statement,
            records,
            run_params,
            self.config.batch_size,
            &stats,
        )
    }

    /// Deletes the stale data of `schema` owned by the sub resource bound in `run_params`.
    pub fn sweep(&self, schema: &NodeSchema, run_params: &RunParams) -> Result<SweepReport> {
        let job = GraphJob::cleanup(schema, run_params, self.config.cleanup_iteration_size)?;
        let stats = self.stats.scoped("sweep").scoped(schema.label());
        job.run(&self.session, &stats)
    }

    /// Sweeps several schemas in order, stopping at the first failure.
    pub fn sweep_all(
        &self,
        schemas: &[&NodeSchema],
        run_params: &RunParams,
    ) -> Result<Vec<SweepReport>> {
        schemas
            .iter()
            .map(|schema| self.sweep(schema, run_params))
            .collect()
    }

    /// Stamps the `ModuleSyncMetadata` node of `target` with `run_tag` and
    /// bumps its counter by the tag.
    pub fn record_run_metadata(&self, target: &SyncTarget, run_tag: i64) -> Result<()> {
        let started = Instant::now();
        let schema = metadata::sync_metadata_schema()?;
        let statement = self.compile(&schema, &RelSelection::All)?;
        let run_params = RunParams::new(run_tag);
        let params = Parameters {
            records: vec![target.record()],
            values: run_params.values().clone(),
        };
        self.session
            .run(&statement, &params)
            .map_err(|source| SyncError::Store {
                label: schema.label().to_owned(),
                source,
            })?;
        self.stats.incr(&target.stat_key(), run_tag);
        metadata::log_recorded(target, &run_params);
        info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "sync.metadata"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkDirection, PropertyRef, RelSchema};
    use crate::query::Value;
    use crate::record;
    use crate::stats::CounterStats;
    use crate::storage::MemoryGraph;

    fn schema() -> NodeSchema {
        NodeSchema::builder("Function")
            .property("id", PropertyRef::new("arn"))
            .property("lastupdated", PropertyRef::run_param("lastupdated"))
            .sub_resource(
                RelSchema::new("Account", "RESOURCE", LinkDirection::Inward)
                    .matching("id", PropertyRef::run_param("ACCOUNT"))
                    .property("lastupdated", PropertyRef::run_param("lastupdated")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn compiles_once_per_selection() {
        let engine = GraphSync::new(MemoryGraph::new(), SyncConfig::default());
        let a = engine.compile(&schema(), &RelSelection::All).unwrap();
        let b = engine.compile(&schema(), &RelSelection::All).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        engine.compile(&schema(), &RelSelection::none()).unwrap();
        assert_eq!(engine.cached_statements(), 2);
    }

    #[test]
    fn cache_is_bounded() {
        let config = SyncConfig {
            statement_cache_size: 1,
            ..SyncConfig::default()
        };
        let engine = GraphSync::new(MemoryGraph::new(), config);
        engine.compile(&schema(), &RelSelection::All).unwrap();
        engine.compile(&schema(), &RelSelection::none()).unwrap();
        assert_eq!(engine.cached_statements(), 1);
    }

    #[test]
    fn records_run_metadata() {
        let counters = Arc::new(CounterStats::new());
        let engine =
            GraphSync::new(MemoryGraph::new(), SyncConfig::default()).with_stats(counters.clone());
        let target = SyncTarget::new("AWSAccount", "1234", "Function");
        engine.record_run_metadata(&target, 100).unwrap();
        engine.record_run_metadata(&target, 200).unwrap();

        let graph = engine.session();
        assert_eq!(graph.node_count("ModuleSyncMetadata"), 1);
        let node = graph.node("SyncMetadata", "AWSAccount_1234_Function").unwrap();
        assert_eq!(node.get("lastupdated"), Some(&Value::Int(200)));
        assert_eq!(node.get("groupid"), Some(&Value::from("1234")));
        assert_eq!(node.get("syncedtype"), Some(&Value::from("Function")));
        assert!(node.get("syncedat").is_some());
        assert_eq!(counters.counter("AWSAccount_1234_Function_lastupdated"), 300);
    }

    #[test]
    fn load_then_sweep() {
        let engine = GraphSync::new(MemoryGraph::new(), SyncConfig::default());
        engine
            .session()
            .insert_node(&["Account"], record! { "id" => "a1" })
            .unwrap();
        let params = |tag| RunParams::new(tag).with("ACCOUNT", "a1");
        engine
            .load(
                &schema(),
                &[record! { "arn" => "f1" }, record! { "arn" => "f2" }],
                &RelSelection::All,
                &params(1),
            )
            .unwrap();
        engine
            .load(&schema(), &[record! { "arn" => "f1" }], &RelSelection::All, &params(2))
            .unwrap();
        let report = engine.sweep(&schema(), &params(2)).unwrap();
        assert_eq!(report.summary.nodes_deleted, 1);
        assert!(engine.session().node("Function", "f2").is_none());
        assert!(engine.session().node("Function", "f1").is_some());
    }
}
