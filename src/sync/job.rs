//! Cleanup jobs.
//!
//! A [`GraphJob`] is a named, ordered list of statements with their bound
//! parameters. The sweeper builds one per node schema and runs it after every
//! entity type of the sub resource has been loaded.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use super::loader::check_parameters;
use super::params::RunParams;
use crate::config::ConfigError;
use crate::error::{Result, SyncError};
use crate::model::NodeSchema;
use crate::query::{build_cleanup_queries, Parameters, Statement, Value, LIMIT_SIZE};
use crate::stats::ScopedStats;
use crate::storage::{GraphSession, Summary};

/// One statement of a job with its bound parameters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobStatement {
    #[serde(skip)]
    statement: Statement,
    query: String,
    parameters: BTreeMap<String, Value>,
    iterative: bool,
    iterationsize: u64,
}

impl JobStatement {
    /// Compiled statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Bound parameters.
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }
}

/// A named sequence of statements run in order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphJob {
    name: String,
    statements: Vec<JobStatement>,
}

/// Outcome of running a job.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Job name.
    pub job: String,
    /// Statements run.
    pub statements: usize,
    /// Round-trips including repeats of iterative statements.
    pub iterations: usize,
    /// Combined store counters.
    pub summary: Summary,
}

impl GraphJob {
    /// Cleanup job for `schema`, bound to `run_params`.
    ///
    /// Fails when the schema cannot be swept, when `run_params` lacks a sub
    /// resource matcher parameter, or when `iteration_size` is zero.
    pub fn cleanup(
        schema: &NodeSchema,
        run_params: &RunParams,
        iteration_size: u64,
    ) -> Result<Self> {
        if iteration_size == 0 {
            return Err(ConfigError::Invalid {
                field: "cleanup_iteration_size",
                reason: "must be greater than zero",
            }
            .into());
        }
        let statements = build_cleanup_queries(schema)?;
        let limit = i64::try_from(iteration_size).unwrap_or(i64::MAX);
        let available = run_params.clone().with(LIMIT_SIZE, limit);
        let mut bound = Vec::with_capacity(statements.len());
        for statement in statements {
            check_parameters(schema.label(), &statement, &available)?;
            let parameters: BTreeMap<String, Value> = statement
                .parameters()
                .iter()
                .filter_map(|name| Some((name.clone(), available.get(name)?.clone())))
                .collect();
            bound.push(JobStatement {
                query: statement.query().to_owned(),
                iterative: statement.is_iterative(),
                iterationsize: iteration_size,
                parameters,
                statement,
            });
        }
        Ok(Self {
            name: format!("Cleanup {}", schema.label()),
            statements: bound,
        })
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statements in execution order.
    pub fn statements(&self) -> &[JobStatement] {
        &self.statements
    }

    /// Pretty JSON dump of the job.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Runs every statement in order. Iterative statements repeat until a
    /// round reports nothing completed.
    pub fn run<S: GraphSession + ?Sized>(
        &self,
        session: &S,
        stats: &ScopedStats,
    ) -> Result<SweepReport> {
        let started = Instant::now();
        let mut report = SweepReport {
            job: self.name.clone(),
            ..SweepReport::default()
        };
        for (idx, job_statement) in self.statements.iter().enumerate() {
            let params = Parameters::from_values(job_statement.parameters.clone());
            loop {
                let summary = session
                    .run(&job_statement.statement, &params)
                    .map_err(|source| SyncError::Store {
                        label: self.name.clone(),
                        source,
                    })?;
                report.iterations += 1;
                report.summary.absorb(&summary);
                debug!(
                    job = %self.name,
                    statement = idx,
                    completed = summary.total_completed,
                    "sync.sweep.statement"
                );
                if !job_statement.iterative || summary.total_completed == 0 {
                    break;
                }
            }
            report.statements += 1;
        }
        stats.timing("sweep", started.elapsed());
        stats.incr(
            "nodes_deleted",
            i64::try_from(report.summary.nodes_deleted).unwrap_or(i64::MAX),
        );
        info!(
            job = %self.name,
            iterations = report.iterations,
            nodes_deleted = report.summary.nodes_deleted,
            relationships_deleted = report.summary.relationships_deleted,
            "sync.sweep"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkDirection, PropertyRef, RelSchema};

    fn schema() -> NodeSchema {
        NodeSchema::builder("Disk")
            .property("id", PropertyRef::new("id"))
            .property("lastupdated", PropertyRef::run_param("lastupdated"))
            .sub_resource(
                RelSchema::new("Project", "RESOURCE", LinkDirection::Inward)
                    .matching("id", PropertyRef::run_param("PROJECT_ID"))
                    .property("lastupdated", PropertyRef::run_param("lastupdated")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn binds_parameters_and_serializes() {
        let params = RunParams::new(42).with("PROJECT_ID", "p1").with("UNUSED", 1);
        let job = GraphJob::cleanup(&schema(), &params, 50).unwrap();
        assert_eq!(job.name(), "Cleanup Disk");
        assert_eq!(job.statements().len(), 2);

        let json: serde_json::Value = serde_json::from_str(&job.to_json().unwrap()).unwrap();
        assert_eq!(json["name"], "Cleanup Disk");
        let first = &json["statements"][0];
        assert_eq!(first["iterative"], true);
        assert_eq!(first["iterationsize"], 50);
        assert_eq!(first["parameters"]["PROJECT_ID"], "p1");
        assert_eq!(first["parameters"]["UPDATE_TAG"], 42);
        assert_eq!(first["parameters"]["LIMIT_SIZE"], 50);
        assert!(first["parameters"].get("UNUSED").is_none());
        assert!(first["query"].as_str().unwrap().contains("DETACH DELETE n"));
    }

    #[test]
    fn zero_iteration_size_rejected() {
        let params = RunParams::new(1).with("PROJECT_ID", "p1");
        let err = GraphJob::cleanup(&schema(), &params, 0).unwrap_err();
        assert_eq!(err.code(), "Config");
        assert!(matches!(
            err,
            SyncError::Config(ConfigError::Invalid {
                field: "cleanup_iteration_size",
                ..
            })
        ));
    }

    #[test]
    fn missing_scope_parameter() {
        let err = GraphJob::cleanup(&schema(), &RunParams::new(1), 10).unwrap_err();
        assert_eq!(err.code(), "MissingRunParameter");
    }
}
