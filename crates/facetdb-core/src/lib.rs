//! Runtime for facetdb: the entity registry, collections, records, the
//! key-value store port and path-based authorization.
//!
//! Schemas come from `facetdb-schema`; this crate turns them into key
//! composition, index routing and gated reads and writes.
#![warn(unreachable_pub)]

pub mod acl;
pub mod collection;
pub mod error;
pub mod hooks;
pub mod key;
pub mod record;
pub mod registry;
pub mod store;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::Error;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        acl::{AclContext, AclRule, Action},
        collection::{
            AccessorResult, Collection, CreateManyResult, CreateOptions, ErrorItem, Page,
            QueryOptions,
        },
        error::{DataAccessError, Error, ErrorClass, PermissionError, ValidationError},
        hooks::{CollectionHooks, NoHooks},
        record::{Record, Related},
        registry::{EntityCatalog, EntityRegistry},
        store::{DataStore, MemoryStore, SortOrder},
    };
}
