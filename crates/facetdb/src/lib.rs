//! ## Crate layout
//! - `schema`: attributes, indexes, references, `Schema` and `SchemaBuilder`.
//! - `core`: the entity registry, collections, records, the store port and
//!   path-based authorization.
//!
//! A process declares its schemas once, registers them in an
//! `EntityCatalog`, then builds one `EntityRegistry` per caller from a store
//! handle and that caller's `AclContext`.

pub use facetdb_core as core;
pub use facetdb_schema as schema;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::Error;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{core::prelude::*, schema::prelude::*};
    pub use crate::{core::Error, schema::Error as SchemaError};
    pub use serde_json::{Map, Value, json};
}
