//! Property resolution rules.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where the value of a [`PropertyRef`] comes from at ingestion time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Read from the current record; when the record has no value, keep the
    /// value already stored on the node or relationship.
    #[default]
    RecordWithFallback,
    /// Read from the current record; a missing value clears the attribute.
    Record,
    /// Read once from the run parameters supplied with the load call.
    RunParam,
}

/// A rule describing how to obtain one attribute value.
///
/// A `PropertyRef` is not a value: it names the record key (or run parameter)
/// that the compiled statement reads, plus flags that influence compilation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawPropertyRef")]
pub struct PropertyRef {
    name: String,
    source: Source,
    ignore_case: bool,
    extra_index: bool,
    create_only: bool,
}

impl PropertyRef {
    /// Reads `name` from each record, keeping the stored value when absent.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_source(name, Source::RecordWithFallback)
    }

    /// Reads `name` from each record; absent values clear the attribute.
    pub fn record(name: impl Into<String>) -> Self {
        Self::with_source(name, Source::Record)
    }

    /// Reads `name` from the run parameters.
    pub fn run_param(name: impl Into<String>) -> Self {
        Self::with_source(name, Source::RunParam)
    }

    fn with_source(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
            ignore_case: false,
            extra_index: false,
            create_only: false,
        }
    }

    /// Compares case-insensitively when used as a target node matcher key.
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Requests an index on this attribute for the owning label.
    pub fn extra_index(mut self) -> Self {
        self.extra_index = true;
        self
    }

    /// Writes the attribute only when the node or relationship is created.
    pub fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }

    /// Record key or run parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolution strategy.
    pub fn source(&self) -> Source {
        self.source
    }

    /// Whether matcher comparisons ignore case.
    pub fn is_ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Whether an index is requested.
    pub fn is_extra_index(&self) -> bool {
        self.extra_index
    }

    /// Whether the attribute is only written on creation.
    pub fn is_create_only(&self) -> bool {
        self.create_only
    }

    /// Whether the value comes from the run parameters.
    pub fn is_run_param(&self) -> bool {
        self.source == Source::RunParam
    }

    /// Whether the value is a run parameter written on every merge, as the
    /// run tag must be.
    pub(crate) fn is_run_stamp(&self) -> bool {
        self.is_run_param() && !self.create_only
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPropertyRef {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        source: Source,
        #[serde(default)]
        ignore_case: bool,
        #[serde(default)]
        extra_index: bool,
        #[serde(default)]
        create_only: bool,
    },
}

impl From<RawPropertyRef> for PropertyRef {
    fn from(raw: RawPropertyRef) -> Self {
        match raw {
            RawPropertyRef::Name(name) => PropertyRef::new(name),
            RawPropertyRef::Full {
                name,
                source,
                ignore_case,
                extra_index,
                create_only,
            } => PropertyRef {
                name,
                source,
                ignore_case,
                extra_index,
                create_only,
            },
        }
    }
}

/// Ordered mapping of attribute name to [`PropertyRef`].
///
/// Declaration order is preserved so that generated statements are stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropertyMap {
    entries: Vec<(String, PropertyRef)>,
}

impl PropertyMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Duplicates are kept and reported by schema validation.
    pub fn push(&mut self, attribute: impl Into<String>, prop: PropertyRef) {
        self.entries.push((attribute.into(), prop));
    }

    /// Looks up the rule for `attribute`.
    pub fn get(&self, attribute: &str) -> Option<&PropertyRef> {
        self.entries
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, prop)| prop)
    }

    /// Returns `true` when `attribute` is declared.
    pub fn contains(&self, attribute: &str) -> bool {
        self.get(attribute).is_some()
    }

    /// Iterates entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyRef)> {
        self.entries.iter().map(|(name, prop)| (name.as_str(), prop))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the first attribute name declared more than once.
    pub(crate) fn first_duplicate(&self) -> Option<&str> {
        self.entries.iter().enumerate().find_map(|(idx, (name, _))| {
            self.entries[..idx]
                .iter()
                .any(|(prev, _)| prev == name)
                .then_some(name.as_str())
        })
    }
}

impl<K: Into<String>> FromIterator<(K, PropertyRef)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (K, PropertyRef)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, prop) in &self.entries {
            map.serialize_entry(name, prop)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PropertyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertyMapVisitor;

        impl<'de> Visitor<'de> for PropertyMapVisitor {
            type Value = PropertyMap;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a table of attribute names to property references")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = PropertyMap::new();
                while let Some((name, prop)) = access.next_entry::<String, PropertyRef>()? {
                    map.push(name, prop);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(PropertyMapVisitor)
    }
}
