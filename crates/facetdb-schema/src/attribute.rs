use derive_more::Display;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::{
    fmt,
    sync::{Arc, LazyLock},
};

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-8][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern is a valid regex")
});

/// Whether `value` is a string in canonical UUID format.
#[must_use]
pub fn is_uuid(value: &str) -> bool {
    UUID_PATTERN.is_match(value)
}

///
/// AttributeValidator
///
/// Caller-supplied predicate run after the type check.
///

pub type AttributeValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

///
/// AttributeKind
///

#[derive(Clone, Debug, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    #[display("any")]
    Any,
    #[display("boolean")]
    Boolean,
    #[display("enum")]
    Enum(Vec<String>),
    #[display("list")]
    List,
    #[display("map")]
    Map,
    #[display("number")]
    Number,
    #[display("set")]
    Set,
    #[display("string")]
    String,
}

impl AttributeKind {
    /// Whether a JSON value has the shape this kind declares.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Boolean => value.is_boolean(),
            Self::Enum(variants) => value
                .as_str()
                .is_some_and(|s| variants.iter().any(|v| v == s)),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
            Self::Number => value.is_number(),
            Self::Set => value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .enumerate()
                    .all(|(i, item)| !items[..i].contains(item))
            }),
            Self::String => value.is_string(),
        }
    }
}

///
/// AttributeDefault
///
/// Generated values are resolved by the runtime at write time; a single
/// write shares one timestamp across every `Timestamp` default.
///

#[derive(Clone)]
pub enum AttributeDefault {
    Value(Value),
    Uuid,
    Timestamp,
    With(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl fmt::Debug for AttributeDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Uuid => f.write_str("Uuid"),
            Self::Timestamp => f.write_str("Timestamp"),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

///
/// Watch
///
/// Attributes whose change causes this attribute to be regenerated from
/// its default.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Watch {
    All,
    Attributes(Vec<String>),
}

impl Watch {
    #[must_use]
    pub fn triggers_on(&self, attribute: &str) -> bool {
        match self {
            Self::All => true,
            Self::Attributes(names) => names.iter().any(|n| n == attribute),
        }
    }
}

///
/// AttributeIssue
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttributeIssue {
    TypeMismatch { expected: AttributeKind },
    Rejected,
}

///
/// Attribute
///

#[derive(Clone)]
pub struct Attribute {
    kind: AttributeKind,
    required: bool,
    read_only: bool,
    hidden: bool,
    default: Option<AttributeDefault>,
    validate: Option<AttributeValidator>,
    watch: Option<Watch>,
}

impl Attribute {
    #[must_use]
    pub const fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            required: false,
            read_only: false,
            hidden: false,
            default: None,
            validate: None,
            watch: None,
        }
    }

    #[must_use]
    pub const fn string() -> Self {
        Self::new(AttributeKind::String)
    }

    #[must_use]
    pub const fn number() -> Self {
        Self::new(AttributeKind::Number)
    }

    #[must_use]
    pub const fn boolean() -> Self {
        Self::new(AttributeKind::Boolean)
    }

    #[must_use]
    pub const fn map() -> Self {
        Self::new(AttributeKind::Map)
    }

    #[must_use]
    pub const fn list() -> Self {
        Self::new(AttributeKind::List)
    }

    #[must_use]
    pub const fn set() -> Self {
        Self::new(AttributeKind::Set)
    }

    #[must_use]
    pub const fn any() -> Self {
        Self::new(AttributeKind::Any)
    }

    #[must_use]
    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(AttributeKind::Enum(
            variants.into_iter().map(Into::into).collect(),
        ))
    }

    /// String attribute that only accepts canonical UUIDs.
    #[must_use]
    pub fn uuid() -> Self {
        Self::string().validate(|v| v.as_str().is_some_and(is_uuid))
    }

    // ------------------------------------------------------------------
    // Modifiers
    // ------------------------------------------------------------------

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(AttributeDefault::Value(value.into()));
        self
    }

    #[must_use]
    pub fn default_uuid(mut self) -> Self {
        self.default = Some(AttributeDefault::Uuid);
        self
    }

    #[must_use]
    pub fn default_timestamp(mut self) -> Self {
        self.default = Some(AttributeDefault::Timestamp);
        self
    }

    #[must_use]
    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(AttributeDefault::With(Arc::new(f)));
        self
    }

    #[must_use]
    pub fn validate(mut self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn watch_all(mut self) -> Self {
        self.watch = Some(Watch::All);
        self
    }

    #[must_use]
    pub fn watch<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watch = Some(Watch::Attributes(
            attributes.into_iter().map(Into::into).collect(),
        ));
        self
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    #[must_use]
    pub const fn default_rule(&self) -> Option<&AttributeDefault> {
        self.default.as_ref()
    }

    #[must_use]
    pub const fn watch_rule(&self) -> Option<&Watch> {
        self.watch.as_ref()
    }

    /// Type-check then run the custom validator. `null` is not accepted
    /// here; absence is handled by the caller via `is_required`.
    pub fn check(&self, value: &Value) -> Result<(), AttributeIssue> {
        if !self.kind.matches(value) {
            return Err(AttributeIssue::TypeMismatch {
                expected: self.kind.clone(),
            });
        }

        match &self.validate {
            Some(validate) if !validate(value) => Err(AttributeIssue::Rejected),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("read_only", &self.read_only)
            .field("hidden", &self.hidden)
            .field("default", &self.default)
            .field("validate", &self.validate.as_ref().map(|_| ".."))
            .field("watch", &self.watch)
            .finish()
    }
}
