//! Name derivation shared by the builder, accessor tables and key
//! composition. All generated names flow through here so that the same
//! entity always produces the same identifiers.

use convert_case::{Case, Casing};

/// `SiteTopPage` -> `siteTopPage`.
#[must_use]
pub fn camel(name: &str) -> String {
    name.to_case(Case::Camel)
}

/// `siteTopPage` -> `SiteTopPage`.
#[must_use]
pub fn pascal(name: &str) -> String {
    name.to_case(Case::Pascal)
}

/// `SiteTopPage` -> `SITE_TOP_PAGE`.
#[must_use]
pub fn upper_snake(name: &str) -> String {
    name.to_case(Case::Snake).to_uppercase()
}

/// Identifier attribute for an entity: `Organization` -> `organizationId`.
#[must_use]
pub fn id_attribute(entity: &str) -> String {
    format!("{}Id", camel(entity))
}

/// Foreign key attribute pointing at `target`. Same shape as the target's
/// own identifier attribute.
#[must_use]
pub fn foreign_key(target: &str) -> String {
    id_attribute(target)
}

/// Resource-path segment for an entity: `SiteTopPage` -> `siteTopPage`.
#[must_use]
pub fn path_segment(entity: &str) -> String {
    camel(entity)
}

/// Naive English plural used for `has_many` accessor names.
#[must_use]
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();

    if lower.ends_with("ss")
        || lower.ends_with('x')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
        || lower.ends_with('z')
    {
        return format!("{word}es");
    }

    if lower.ends_with('s') {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if !matches!(before, Some('a' | 'e' | 'i' | 'o' | 'u') | None) {
            return format!("{stem}ies");
        }
    }

    format!("{word}s")
}

/// Accessor method name for a sequence of index facets:
/// `("allBy", ["organizationId", "status"])` -> `allByOrganizationIdAndStatus`.
#[must_use]
pub fn facet_accessor(prefix: &str, facets: &[String]) -> String {
    let joined = facets
        .iter()
        .map(|f| pascal(f))
        .collect::<Vec<_>>()
        .join("And");

    format!("{prefix}{joined}")
}

/// `getName` / `setName` style attribute accessor.
#[must_use]
pub fn attribute_accessor(prefix: &str, attribute: &str) -> String {
    format!("{prefix}{}", pascal(attribute))
}
