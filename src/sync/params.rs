//! Run-scoped parameters.

use std::collections::BTreeMap;

use crate::query::{Value, LASTUPDATED, UPDATE_TAG};

/// Parameters shared by every statement of one collector run.
///
/// The update tag is always present, bound both as `lastupdated` (read by
/// upserts) and `UPDATE_TAG` (read by cleanup).
#[derive(Clone, Debug, PartialEq)]
pub struct RunParams {
    update_tag: i64,
    values: BTreeMap<String, Value>,
}

impl RunParams {
    /// Parameters for a run tagged `update_tag`.
    pub fn new(update_tag: i64) -> Self {
        let mut values = BTreeMap::new();
        values.insert(LASTUPDATED.to_owned(), Value::Int(update_tag));
        values.insert(UPDATE_TAG.to_owned(), Value::Int(update_tag));
        Self { update_tag, values }
    }

    /// Adds a named parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a named parameter. The tag parameters cannot be replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        if name == LASTUPDATED || name == UPDATE_TAG {
            return;
        }
        self.values.insert(name, value.into());
    }

    /// Tag of this run.
    pub fn update_tag(&self) -> i64 {
        self.update_tag
    }

    /// Looks up a parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Every bound parameter.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}
