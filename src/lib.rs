//! # Recipe
//!
//! Declarative metric and dimension shelves that compile to multi-dialect SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Shelf definition (YAML / serde_yaml)            │
//! │   (metrics, dimensions, filters, havings, formats)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [schema: parse + validate]
//! ┌─────────────────────────────────────────────────────────┐
//! │      FieldDescriptor / Condition / IngredientSpec        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [ingredient::build]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Shelf of Ingredients                     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [recipe + extensions]
//! ┌─────────────────────────────────────────────────────────┐
//! │                    SQL Query                             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [Session::fetch, Shelf::enchant]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Enchanted rows                          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod ingredient;
pub mod recipe;
pub mod row;
pub mod schema;
pub mod selectable;
pub mod shelf;
pub mod sql;
pub mod value;

pub use error::{BadIngredient, BadRecipe, RecipeError, RecipeResult};

/// Commonly used types.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{BadIngredient, BadRecipe, RecipeError, RecipeResult};
    pub use crate::ingredient::{DivideByZero, Family, Formatter, Ingredient};
    pub use crate::recipe::{Anonymize, AutomaticFilters, Extension, Recipe, Session, SessionError};
    pub use crate::row::Row;
    pub use crate::schema::{parse_field, FieldContext, SchemaConfig, SchemaValidator};
    pub use crate::selectable::Selectable;
    pub use crate::shelf::{IngredientRef, Shelf};
    pub use crate::sql::{Dialect, Query};
    pub use crate::value::Value;
}
