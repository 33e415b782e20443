//! Schema layer for facetdb: entity attributes, indexes, relationship
//! references, the validated `Schema` and the fluent `SchemaBuilder`.
//!
//! Nothing in this crate touches a store. It describes *what exists*; the
//! runtime in `facetdb-core` decides *what runs*.

pub mod attribute;
pub mod builder;
pub mod error;
pub mod index;
pub mod naming;
pub mod reference;
pub mod schema;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

/// Maximum length for entity names.
pub const MAX_ENTITY_NAME_LEN: usize = 64;

/// Maximum number of secondary indexes per entity.
///
/// The backing store budgets five indexes per record: the primary plus
/// four secondaries.
pub const MAX_SECONDARY_INDEXES: usize = 4;

/// Hard cap on the total number of indexes per entity.
pub const MAX_INDEXES: usize = MAX_SECONDARY_INDEXES + 1;

pub use builder::{CREATED_AT, UPDATED_AT};
pub use error::Error;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        attribute::{Attribute, AttributeDefault, AttributeKind, Watch},
        builder::{CREATED_AT, SchemaBuilder, UPDATED_AT},
        error::{Error, ReferenceError, SchemaBuilderError, SchemaValidationError},
        index::{Index, IndexKey, IndexType},
        reference::{
            AccessorConfig, AccessorKind, ForeignKeySource, Reference, ReferenceKind,
            ReferenceOptions,
        },
        schema::{
            AttributeAccess, AttributeAccessor, IndexAccessor, Schema, SchemaOptions, SchemaParts,
            SchemaResolver,
        },
        storage::StorageSchema,
    };
}
