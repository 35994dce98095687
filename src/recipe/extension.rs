//! Recipe extensions.
//!
//! Compilation calls every registered extension, in registration order, at
//! four checkpoints:
//!
//! ```text
//! add_ingredients         inject ingredients into the working cauldron
//! modify_recipe_parts     rewrite columns, group-bys, filters, havings, order-bys
//! modify_prequery_parts   rewrite the assembled query before the table check
//! modify_postquery_parts  rewrite the final query before limit/offset
//! ```
//!
//! An extension reports itself dirty when its configuration changed since
//! the last compile; a dirty extension invalidates the cached query.

use std::any::Any;
use std::fmt;

use crate::error::RecipeResult;
use crate::shelf::Shelf;
use crate::sql::{Expr, OrderByExpr, Query, SelectExpr};

/// Query parts gathered from the cauldron, before a query exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeParts {
    pub columns: Vec<SelectExpr>,
    pub group_bys: Vec<Expr>,
    pub filters: Vec<Expr>,
    pub havings: Vec<Expr>,
    pub order_bys: Vec<OrderByExpr>,
}

/// An assembled query plus the parts it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParts {
    pub query: Query,
    pub group_bys: Vec<Expr>,
    pub filters: Vec<Expr>,
    pub havings: Vec<Expr>,
    pub order_bys: Vec<OrderByExpr>,
}

pub trait Extension: fmt::Debug {
    fn name(&self) -> &str;

    fn is_dirty(&self) -> bool;

    fn mark_clean(&mut self);

    /// Add ingredients to `cauldron`, a working copy of the recipe's
    /// selected ingredients. `shelf` is the recipe's shelf.
    fn add_ingredients(&mut self, _shelf: &Shelf, _cauldron: &mut Shelf) -> RecipeResult<()> {
        Ok(())
    }

    fn modify_recipe_parts(&mut self, parts: RecipeParts) -> RecipeResult<RecipeParts> {
        Ok(parts)
    }

    fn modify_prequery_parts(&mut self, parts: QueryParts) -> RecipeResult<QueryParts> {
        Ok(parts)
    }

    fn modify_postquery_parts(&mut self, parts: QueryParts) -> RecipeResult<QueryParts> {
        Ok(parts)
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
