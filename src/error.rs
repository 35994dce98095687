//! Crate-wide error types.
//!
//! Each area has its own enum; [`RecipeError`] wraps them all so callers
//! can use a single `?` chain.

use thiserror::Error;

use crate::config::SettingsError;
use crate::ingredient::{Family, FormatError};
use crate::recipe::SessionError;
use crate::schema::SchemaError;

/// A single ingredient's construction-time contract was violated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BadIngredient {
    #[error("ingredient '{id}' has {columns} columns; column_suffixes must be supplied if there is more than one column")]
    AmbiguousColumns { id: String, columns: usize },

    #[error("ingredient '{id}' has {columns} columns but {suffixes} column_suffixes")]
    SuffixCountMismatch {
        id: String,
        columns: usize,
        suffixes: usize,
    },

    #[error("lookup for '{0}' must be a mapping")]
    LookupNotMapping(String),

    #[error("column '{column}' does not exist on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("invalid ingredient '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

/// A recipe-level reference or combination is invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BadRecipe {
    #[error("{0} doesn't exist on the shelf")]
    UnknownIngredient(String),

    #[error("'{name}' is a {found}, expected {expected}")]
    WrongKind {
        name: String,
        expected: String,
        found: Family,
    },

    #[error("'{0}' is a raw specification and needs a constructor")]
    NeedsConstructor(String),

    #[error("No ingredients have been added to this recipe")]
    NoIngredients,

    #[error("Recipes must use ingredients that all come from the same table, found: {}", .0.join(", "))]
    MultipleTables(Vec<String>),

    #[error("Recipes must select from a table")]
    NoTable,

    #[error("'{operator}' is not a valid operator for a {shape} value")]
    InvalidFilterOperator { operator: String, shape: &'static str },

    #[error("between needs a lower and an upper bound, got {0} values")]
    BetweenArity(usize),

    #[error("ingredient '{0}' has no columns to filter or order on")]
    NoColumns(String),

    #[error("stats are not available until the recipe has been run")]
    StatsNotReady,

    #[error("invalid recipe configuration: {0}")]
    InvalidConfig(String),
}

/// Any failure surfaced by this crate.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error(transparent)]
    BadIngredient(#[from] BadIngredient),

    #[error(transparent)]
    BadRecipe(#[from] BadRecipe),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to hash recipe: {0}")]
    Hash(#[from] serde_json::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type RecipeResult<T> = Result<T, RecipeError>;
