use crate::error::{IssueKind, ValidationError, ValidationIssue};
use chrono::{SecondsFormat, Utc};
use facetdb_schema::{attribute::AttributeIssue, prelude::*};
use serde_json::{Map, Value};

/// Write timestamp: RFC 3339, UTC, millisecond precision.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Value produced by a default rule. `now` is shared by every timestamp
/// default within one write.
#[must_use]
pub fn resolve_default(rule: &AttributeDefault, now: &str) -> Value {
    match rule {
        AttributeDefault::Value(value) => value.clone(),
        AttributeDefault::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
        AttributeDefault::Timestamp => Value::String(now.to_string()),
        AttributeDefault::With(f) => f(),
    }
}

fn issue_for(attribute: &str, issue: AttributeIssue) -> ValidationIssue {
    let kind = match issue {
        AttributeIssue::TypeMismatch { expected } => IssueKind::TypeMismatch {
            expected: expected.to_string(),
        },
        AttributeIssue::Rejected => IssueKind::Rejected,
    };

    ValidationIssue {
        attribute: attribute.to_string(),
        kind,
    }
}

/// Attributes for a new record: unknown names rejected, nulls dropped,
/// defaults applied, values checked, required attributes and primary key
/// facets present. Every problem is reported at once.
pub fn prepare_new(
    schema: &Schema,
    input: Map<String, Value>,
    now: &str,
) -> Result<Map<String, Value>, ValidationError> {
    let mut issues = Vec::new();
    let mut out = Map::new();

    for (name, value) in input {
        if schema.attribute(&name).is_none() {
            issues.push(ValidationIssue {
                attribute: name,
                kind: IssueKind::Unknown,
            });
        } else if !value.is_null() {
            out.insert(name, value);
        }
    }

    let primary_facets: Vec<&str> = schema.primary_index().facets().collect();

    for (name, attr) in schema.attributes() {
        if !out.contains_key(name)
            && let Some(rule) = attr.default_rule()
        {
            let value = resolve_default(rule, now);
            if !value.is_null() {
                out.insert(name.clone(), value);
            }
        }

        match out.get(name) {
            Some(value) => {
                if let Err(issue) = attr.check(value) {
                    issues.push(issue_for(name, issue));
                }
            }
            None if attr.is_required() || primary_facets.contains(&name.as_str()) => {
                issues.push(ValidationIssue {
                    attribute: name.clone(),
                    kind: IssueKind::Missing,
                });
            }
            None => {}
        }
    }

    if issues.is_empty() {
        Ok(out)
    } else {
        Err(ValidationError {
            entity: schema.entity_name().to_string(),
            issues,
        })
    }
}

/// Check one attribute write on an existing record.
pub fn check_update(schema: &Schema, name: &str, value: &Value) -> Result<(), ValidationError> {
    let entity = schema.entity_name();
    let Some(attr) = schema.attribute(name) else {
        return Err(ValidationError::single(entity, name, IssueKind::Unknown));
    };

    if attr.is_read_only() || schema.primary_index().facets().any(|f| f == name) {
        return Err(ValidationError::single(entity, name, IssueKind::ReadOnly));
    }

    if value.is_null() {
        return if attr.is_required() {
            Err(ValidationError::single(entity, name, IssueKind::Missing))
        } else {
            Ok(())
        };
    }

    attr.check(value).map_err(|issue| ValidationError {
        entity: entity.to_string(),
        issues: vec![issue_for(name, issue)],
    })
}
