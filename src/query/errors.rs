#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// Structured errors raised while defining or compiling an entity schema.
///
/// These are always fatal for the schema in question and are never retried:
/// they point at a mistake in the collector module that declared the schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A node schema was declared without a primary label.
    #[error("node schema requires a non-empty label")]
    EmptyLabel,
    /// Label, relationship label or attribute name is not a plain identifier.
    #[error("'{name}' is not a valid {kind} identifier")]
    InvalidIdentifier { kind: &'static str, name: String },
    /// A required attribute (`id` or `lastupdated`) is missing.
    #[error("schema '{owner}' must define the '{property}' property")]
    MissingProperty { owner: String, property: &'static str },
    /// An attribute collides with a name the compiler sets automatically.
    #[error(
        "'{property}' is reserved and set automatically; it cannot be declared on '{owner}'"
    )]
    ReservedProperty { owner: String, property: String },
    /// The same attribute was declared twice.
    #[error("property '{property}' is declared more than once on '{owner}'")]
    DuplicateProperty { owner: String, property: String },
    /// A relationship carries no usable properties definition.
    #[error(
        "relationship '{rel}' has malformed properties: {reason}; declare a properties table containing 'lastupdated'"
    )]
    MalformedRelProperties { rel: String, reason: String },
    /// A relationship matcher has no keys.
    #[error("relationship '{rel}' needs at least one target node matcher key")]
    EmptyMatcher { rel: String },
    /// `ignore_case` was requested on the sub resource matcher.
    #[error("ignore_case is not supported on sub resource relationship '{rel}' (key '{key}')")]
    IgnoreCaseOnSubResource { rel: String, key: String },
    /// `ignore_case` was set on a node or relationship property rather than a matcher key.
    #[error("ignore_case only applies to target node matcher keys (found on '{owner}.{property}')")]
    IgnoreCaseOutsideMatcher { owner: String, property: String },
    /// The identity key was declared as create-only or run-scoped.
    #[error("'id' on '{owner}' must be read from the input record")]
    InvalidIdentity { owner: String },
    /// `lastupdated` must be a run parameter written on every merge.
    #[error("'lastupdated' on '{owner}' must be a run parameter written on every merge")]
    InvalidRunTag { owner: String },
    /// Two relationships on a schema share the same key.
    #[error("relationship '{rel}' is declared more than once on '{label}'")]
    DuplicateRelationship { label: String, rel: String },
    /// A selected relationship does not exist on the schema.
    #[error("relationship '{rel}' is not present on node schema '{label}'")]
    UnknownRelationship { label: String, rel: String },
    /// Cleanup was requested for a schema that has no sub resource.
    #[error("cannot build cleanup for '{label}': no sub resource relationship is defined")]
    MissingSubResource { label: String },
    /// Cleanup requires every sub resource matcher value to be run-scoped.
    #[error(
        "sub resource matcher key '{key}' on '{rel}' must be a run parameter for cleanup to be scoped"
    )]
    SubResourceNotRunScoped { rel: String, key: String },
}

impl SchemaError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::EmptyLabel => "EmptyLabel",
            SchemaError::InvalidIdentifier { .. } => "InvalidIdentifier",
            SchemaError::MissingProperty { .. } => "MissingProperty",
            SchemaError::ReservedProperty { .. } => "ReservedProperty",
            SchemaError::DuplicateProperty { .. } => "DuplicateProperty",
            SchemaError::MalformedRelProperties { .. } => "MalformedRelProperties",
            SchemaError::EmptyMatcher { .. } => "EmptyMatcher",
            SchemaError::IgnoreCaseOnSubResource { .. } => "IgnoreCaseOnSubResource",
            SchemaError::IgnoreCaseOutsideMatcher { .. } => "IgnoreCaseOutsideMatcher",
            SchemaError::InvalidIdentity { .. } => "InvalidIdentity",
            SchemaError::InvalidRunTag { .. } => "InvalidRunTag",
            SchemaError::DuplicateRelationship { .. } => "DuplicateRelationship",
            SchemaError::UnknownRelationship { .. } => "UnknownRelationship",
            SchemaError::MissingSubResource { .. } => "MissingSubResource",
            SchemaError::SubResourceNotRunScoped { .. } => "SubResourceNotRunScoped",
        }
    }
}

/// Convenience wrapper that formats schema errors with their codes.
pub struct SchemaErrorWithCode<'a>(pub &'a SchemaError);

impl fmt::Display for SchemaErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

/// Checks that `name` is a plain identifier safe to splice into statement text.
pub(crate) fn check_identifier(kind: &'static str, name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            kind,
            name: name.to_owned(),
        })
    }
}
