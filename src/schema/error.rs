//! Schema validation errors.

use thiserror::Error;

/// A shape violation found while validating a field or condition.
///
/// `path` names the offending key, e.g. `field.operators[1].operator`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {constraint}")]
pub struct SchemaError {
    pub path: String,
    pub constraint: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            constraint: constraint.into(),
        }
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Join a child key onto a parent path.
pub(crate) fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else if child.starts_with('[') {
        format!("{}{}", parent, child)
    } else {
        format!("{}.{}", parent, child)
    }
}
