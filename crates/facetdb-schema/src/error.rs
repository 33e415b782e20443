use thiserror::Error as ThisError;

///
/// Error
///
/// Configuration-time failure raised while declaring or validating a schema.
/// These are programmer errors and are expected to surface at startup.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Builder(#[from] SchemaBuilderError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Validation(#[from] SchemaValidationError),
}

///
/// SchemaValidationError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum SchemaValidationError {
    #[error("schema '{entity}' declares index '{index}' more than once")]
    DuplicateIndex { entity: String, index: String },

    #[error("schema '{entity}' attribute '{attribute}' has an invalid default: {reason}")]
    InvalidAttributeDefault {
        entity: String,
        attribute: String,
        reason: String,
    },

    #[error("invalid entity name '{name}': {reason}")]
    InvalidEntityName { name: String, reason: String },

    #[error("schema '{entity}' has an invalid schema version: {version} (must be a positive integer)")]
    InvalidSchemaVersion { entity: String, version: u32 },

    #[error("schema '{entity}' index '{index}' references unknown attribute '{attribute}'")]
    MissingAttributeForFacet {
        entity: String,
        index: String,
        attribute: String,
    },

    #[error("schema '{entity}' is missing attributes")]
    MissingAttributes { entity: String },

    #[error(
        "schema '{entity}' belongs_to reference to '{target}' requires foreign key attribute '{attribute}'"
    )]
    MissingForeignKeyAttribute {
        entity: String,
        target: String,
        attribute: String,
    },

    #[error(
        "schema '{entity}' belongs_to reference to '{target}' requires a secondary index on '{attribute}'"
    )]
    MissingForeignKeyIndex {
        entity: String,
        target: String,
        attribute: String,
    },

    #[error("schema '{entity}' is missing identifier attribute '{attribute}'")]
    MissingIdAttribute { entity: String, attribute: String },

    #[error("schema '{entity}' is missing indexes")]
    MissingIndexes { entity: String },

    #[error("schema '{entity}' has no primary index")]
    MissingPrimaryIndex { entity: String },

    #[error("schema '{entity}' is missing a service name")]
    MissingServiceName { entity: String },

    #[error("schema '{entity}' declares {count} primary indexes, expected exactly 1")]
    MultiplePrimaryIndexes { entity: String, count: usize },

    #[error("schema '{entity}' declares {count} indexes (max {max})")]
    TooManyIndexes {
        entity: String,
        count: usize,
        max: usize,
    },
}

///
/// SchemaBuilderError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum SchemaBuilderError {
    #[error("schema builder for '{entity}' already has attribute '{attribute}'")]
    DuplicateAttribute { entity: String, attribute: String },

    #[error("schema builder for '{entity}': attribute name is required")]
    EmptyAttributeName { entity: String },

    #[error("schema builder: entity name is required")]
    EmptyEntityName,

    #[error("schema builder for '{entity}': {what} must be a non-empty list of attribute names")]
    EmptyKeys { entity: String, what: &'static str },

    #[error("schema builder for '{entity}': service name is required")]
    EmptyServiceName { entity: String },

    #[error("schema builder for '{entity}': schema version must be a positive integer")]
    InvalidSchemaVersion { entity: String },

    #[error("schema builder for '{entity}': {count} secondary indexes requested (max {max})")]
    TooManySecondaryIndexes {
        entity: String,
        count: usize,
        max: usize,
    },
}

///
/// ReferenceError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum ReferenceError {
    #[error("invalid reference type '{0}' (expected belongs_to, has_one or has_many)")]
    InvalidType(String),

    #[error("reference target is required")]
    EmptyTarget,

    #[error("reference target '{target}' declares a blank sort key")]
    BlankSortKey { target: String },

    #[error("cannot derive accessors for reference to '{target}': owning entity '{owner}' is not registered")]
    UnknownOwner { owner: String, target: String },
}
