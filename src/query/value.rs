//! Canonical scalar value representation shared by records, run parameters and
//! the backing store.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single attribute value as it appears in an input record, a run parameter
/// or a stored node/relationship.
///
/// The serde representation is untagged so that plain JSON documents produced
/// by collectors deserialize without any wrapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null literal. Writing null to an attribute removes it.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Homogeneous or mixed list of values.
    List(Vec<Value>),
}

/// One flat key-value input record supplied by a collector.
pub type Record = BTreeMap<String, Value>;

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string payload when this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload when this is a [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Equality with Cypher semantics: null never equals anything and numbers
    /// compare across integer/float representations.
    pub fn graph_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.graph_eq(y))
            }
            (a, b) => a == b,
        }
    }

    /// Strict ordering with Cypher semantics: numbers compare across
    /// representations, strings lexically, anything else is incomparable and
    /// yields `false`.
    pub fn graph_lt(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a < b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) < *b,
            (Value::Float(a), Value::Int(b)) => *a < (*b as f64),
            (Value::Float(a), Value::Float(b)) => a < b,
            (Value::String(a), Value::String(b)) => a < b,
            _ => false,
        }
    }

    /// Case-insensitive equality used by `ignore_case` matchers. Non-string
    /// values fall back to [`Value::graph_eq`].
    pub fn graph_eq_ignore_case(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
            (a, b) => a.graph_eq(b),
        }
    }

    /// Stable key usable for hash lookups of identity values.
    ///
    /// Returns `None` for null, which can never identify a node.
    pub fn identity_key(&self) -> Option<IdentityKey> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(IdentityKey::Bool(*b)),
            Value::Int(i) => Some(IdentityKey::Int(*i)),
            // `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
            Value::Float(f) if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f) => {
                Some(IdentityKey::Int(*f as i64))
            }
            Value::Float(f) => Some(IdentityKey::Float(f.to_bits())),
            Value::String(s) => Some(IdentityKey::String(s.clone())),
            Value::List(items) => items
                .iter()
                .map(Value::identity_key)
                .collect::<Option<Vec<_>>>()
                .map(IdentityKey::List),
        }
    }
}

/// Hashable projection of a non-null [`Value`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    /// Boolean identity.
    Bool(bool),
    /// Integer identity (also used for integral floats).
    Int(i64),
    /// Bit pattern of a non-integral float.
    Float(u64),
    /// String identity.
    String(String),
    /// List identity.
    List(Vec<IdentityKey>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Builds a [`Record`] from `key => value` pairs.
///
/// ```
/// use graphsync::record;
/// let r = record! { "id" => "a", "val" => 1 };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::query::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::query::Record::new();
        $(record.insert(::std::string::String::from($key), $crate::query::Value::from($value));)+
        record
    }};
}
