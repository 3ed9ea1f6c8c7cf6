#![forbid(unsafe_code)]

//! Operational counters.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Receiver of counters and timings emitted during a sync.
///
/// Implementations forward to a metrics backend; the engine only ever calls
/// these two methods.
pub trait StatsSink: Send + Sync {
    /// Adds `value` to the counter `key`.
    fn incr(&self, key: &str, value: i64);

    /// Records one timing sample for `key`.
    fn timing(&self, key: &str, elapsed: Duration);
}

/// A sink that drops everything.
#[derive(Default)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn incr(&self, _key: &str, _value: i64) {}
    fn timing(&self, _key: &str, _elapsed: Duration) {}
}

/// An in-memory sink that keeps running totals.
#[derive(Default)]
pub struct CounterStats {
    counters: Mutex<BTreeMap<String, i64>>,
    timings: Mutex<BTreeMap<String, Vec<Duration>>>,
}

impl CounterStats {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter; zero if never incremented.
    pub fn counter(&self, key: &str) -> i64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of timing samples recorded under `key`.
    pub fn timing_count(&self, key: &str) -> usize {
        self.timings.lock().get(key).map_or(0, Vec::len)
    }

    /// Copy of every counter.
    pub fn counters(&self) -> BTreeMap<String, i64> {
        self.counters.lock().clone()
    }
}

impl StatsSink for CounterStats {
    fn incr(&self, key: &str, value: i64) {
        *self.counters.lock().entry(key.to_owned()).or_insert(0) += value;
    }

    fn timing(&self, key: &str, elapsed: Duration) {
        self.timings
            .lock()
            .entry(key.to_owned())
            .or_default()
            .push(elapsed);
    }
}

/// Returns the default sink, which discards everything.
pub fn default_stats() -> Arc<dyn StatsSink> {
    Arc::new(NoopStats)
}

/// A sink handle that prefixes every key with a dotted scope.
#[derive(Clone)]
pub struct ScopedStats {
    sink: Arc<dyn StatsSink>,
    prefix: String,
}

impl ScopedStats {
    /// Unprefixed handle on `sink`.
    pub fn root(sink: Arc<dyn StatsSink>) -> Self {
        Self {
            sink,
            prefix: String::new(),
        }
    }

    /// Handle whose keys are prefixed with `scope`, nested under this one.
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            prefix: self.key(scope),
        }
    }

    /// Current prefix, empty at the root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Adds `value` to `key` under this scope.
    pub fn incr(&self, key: &str, value: i64) {
        self.sink.incr(&self.key(key), value);
    }

    /// Records a timing for `key` under this scope.
    pub fn timing(&self, key: &str, elapsed: Duration) {
        self.sink.timing(&self.key(key), elapsed);
    }

    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{key}", self.prefix)
        }
    }
}

impl Default for ScopedStats {
    fn default() -> Self {
        Self::root(default_stats())
    }
}
