#![forbid(unsafe_code)]

//! Declarative entity schemas.
//!
//! A collector describes each entity type it owns with a [`NodeSchema`]: the
//! label, the attributes and how to resolve each of them ([`PropertyRef`]),
//! and the relationships ([`RelSchema`]) that connect the entity to the rest of
//! the graph. Schemas are plain immutable values, validated once when built.

mod node;
mod property;
mod relationship;

pub use node::{NodeSchema, NodeSchemaBuilder, FIRSTSEEN, REQUIRED_NODE_PROPERTIES};
pub use property::{PropertyMap, PropertyRef, Source};
pub use relationship::{LinkDirection, RelKey, RelSchema, TargetNodeMatcher};
