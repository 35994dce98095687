//! The shelf: a named registry of ingredients available to a recipe.
//!
//! Assigning into a shelf always stores a private copy whose id is the
//! slot name; reading re-stamps the shelf's anonymize policy. The shelf also
//! remembers the order in which names were first *used* by a query, which
//! ranks [`Shelf::dimension_ids`] and [`Shelf::metric_ids`].

mod enchant;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde_yaml::Value as YamlValue;
use tracing::debug;

use crate::config::Settings;
use crate::error::{BadRecipe, RecipeResult};
use crate::ingredient::{ExpressionBuilder, Family, Ingredient};
use crate::schema::{parse_shelf, SchemaValidator};
use crate::selectable::Selectable;
use crate::sql::{sum, Dialect, Expr, SelectExpr, SortDir};

// =============================================================================
// References
// =============================================================================

/// Anything a recipe can name an ingredient by.
#[derive(Debug, Clone)]
pub enum IngredientRef {
    /// A shelf key, optionally `-`-prefixed for descending order.
    Name(String),
    Ingredient(Ingredient),
    Expr(Expr),
    /// A raw condition mapping, built by a constructor.
    Spec(YamlValue),
}

impl From<&str> for IngredientRef {
    fn from(name: &str) -> Self {
        IngredientRef::Name(name.to_string())
    }
}

impl From<String> for IngredientRef {
    fn from(name: String) -> Self {
        IngredientRef::Name(name)
    }
}

impl From<&String> for IngredientRef {
    fn from(name: &String) -> Self {
        IngredientRef::Name(name.clone())
    }
}

impl From<Ingredient> for IngredientRef {
    fn from(ingredient: Ingredient) -> Self {
        IngredientRef::Ingredient(ingredient)
    }
}

impl From<Expr> for IngredientRef {
    fn from(expr: Expr) -> Self {
        IngredientRef::Expr(expr)
    }
}

impl From<YamlValue> for IngredientRef {
    fn from(spec: YamlValue) -> Self {
        IngredientRef::Spec(spec)
    }
}

/// Compiled query parts, ingredients taken in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShelfParts {
    pub columns: Vec<SelectExpr>,
    pub group_bys: Vec<Expr>,
    /// Deduplicated by rendered SQL, first occurrence wins.
    pub filters: Vec<Expr>,
    pub havings: Vec<Expr>,
}

// =============================================================================
// Shelf
// =============================================================================

#[derive(Debug, Clone)]
pub struct Shelf {
    ingredients: BTreeMap<String, Ingredient>,
    ingredient_order: Vec<String>,
    anonymize: bool,
    selectable: Selectable,
}

impl Shelf {
    pub fn new(selectable: Selectable) -> Self {
        Self {
            ingredients: BTreeMap::new(),
            ingredient_order: Vec::new(),
            anonymize: false,
            selectable,
        }
    }

    /// A shelf of the same table and policy with no ingredients.
    pub fn empty_like(&self) -> Self {
        Self {
            ingredients: BTreeMap::new(),
            ingredient_order: Vec::new(),
            anonymize: self.anonymize,
            selectable: self.selectable.clone(),
        }
    }

    /// Build a shelf from a declarative definition mapping.
    pub fn from_config(raw: &YamlValue, selectable: Selectable, settings: &Settings) -> RecipeResult<Self> {
        let validator = SchemaValidator::new(settings.schema_config()?);
        let specs = parse_shelf(raw, &validator)?;
        let mut shelf = Shelf::new(selectable);
        {
            let builder = ExpressionBuilder::new(&shelf.selectable).with_epsilon(settings.divide.epsilon);
            for (name, spec) in &specs {
                let ingredient = builder.ingredient(name, spec)?;
                shelf.ingredients.insert(name.clone(), ingredient);
            }
        }
        debug!(ingredients = shelf.len(), table = %shelf.selectable.table().table, "loaded shelf");
        Ok(shelf)
    }

    pub fn from_yaml(text: &str, selectable: Selectable, settings: &Settings) -> RecipeResult<Self> {
        let raw: YamlValue = serde_yaml::from_str(text)?;
        Self::from_config(&raw, selectable, settings)
    }

    /// String columns become dimensions, numeric columns summed metrics.
    pub fn automatic(selectable: Selectable) -> RecipeResult<Self> {
        let mut shelf = Shelf::new(selectable);
        let columns = shelf.selectable.columns().to_vec();
        for (name, data_type) in columns {
            let column = shelf.selectable.column(&name)?;
            if data_type.is_string() {
                shelf.insert(&name, &Ingredient::dimension(column));
            } else if data_type.is_numeric() {
                shelf.insert(&name, &Ingredient::metric(sum(column)));
            }
        }
        Ok(shelf)
    }

    pub fn selectable(&self) -> &Selectable {
        &self.selectable
    }

    pub fn anonymize(&self) -> bool {
        self.anonymize
    }

    /// Anonymize policy stamped onto every ingredient read or stored.
    pub fn set_anonymize(&mut self, anonymize: bool) {
        self.anonymize = anonymize;
        for ingredient in self.ingredients.values_mut() {
            ingredient.anonymize = anonymize;
        }
    }

    /// Store a copy of `ingredient` under `name`; the copy's id becomes
    /// `name`. The caller's ingredient is untouched.
    pub fn insert(&mut self, name: &str, ingredient: &Ingredient) {
        let mut copy = ingredient.clone();
        copy.id = name.to_string();
        copy.anonymize = self.anonymize;
        self.ingredients.insert(name.to_string(), copy);
    }

    pub fn with(mut self, name: &str, ingredient: Ingredient) -> Self {
        self.insert(name, &ingredient);
        self
    }

    /// A copy of the ingredient under `name`, re-stamped with this shelf's
    /// id and anonymize policy.
    pub fn get(&self, name: &str) -> Option<Ingredient> {
        self.ingredients.get(name).map(|ingredient| {
            let mut copy = ingredient.clone();
            copy.id = name.to_string();
            copy.anonymize = self.anonymize;
            copy
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ingredients.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Ingredient> {
        self.ingredients.remove(name)
    }

    pub fn len(&self) -> usize {
        self.ingredients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }

    /// Ingredients in id order.
    pub fn ingredients(&self) -> impl Iterator<Item = &Ingredient> {
        self.ingredients.values()
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Resolve a reference to an ingredient of one of the `expected`
    /// families. Raw expressions and specs need [`resolve_with`](Self::resolve_with).
    pub fn resolve(&self, reference: impl Into<IngredientRef>, expected: &[Family]) -> RecipeResult<Ingredient> {
        self.resolve_with(reference, expected, |reference, _| {
            Err(BadRecipe::NeedsConstructor(describe_ref(&reference)).into())
        })
    }

    /// Like [`resolve`](Self::resolve), but raw expressions and specs are
    /// handed to `constructor` first.
    pub fn resolve_with<F>(
        &self,
        reference: impl Into<IngredientRef>,
        expected: &[Family],
        constructor: F,
    ) -> RecipeResult<Ingredient>
    where
        F: FnOnce(IngredientRef, &Shelf) -> RecipeResult<Ingredient>,
    {
        let (ingredient, name) = match reference.into() {
            IngredientRef::Name(name) => {
                let (bare, descending) = match name.strip_prefix('-') {
                    Some(bare) => (bare, true),
                    None => (name.as_str(), false),
                };
                let mut ingredient = self
                    .get(bare)
                    .ok_or_else(|| BadRecipe::UnknownIngredient(bare.to_string()))?;
                if descending {
                    ingredient.ordering = SortDir::Desc;
                }
                (ingredient, bare.to_string())
            }
            IngredientRef::Ingredient(ingredient) => {
                let name = ingredient.id.clone();
                (ingredient, name)
            }
            other @ (IngredientRef::Expr(_) | IngredientRef::Spec(_)) => {
                let ingredient = constructor(other, self)?;
                let name = ingredient.id.clone();
                (ingredient, name)
            }
        };

        if !expected.is_empty() && !expected.contains(&ingredient.family()) {
            let expected = expected
                .iter()
                .map(Family::to_string)
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(BadRecipe::WrongKind {
                name,
                expected,
                found: ingredient.family(),
            }
            .into());
        }
        Ok(ingredient)
    }

    // -------------------------------------------------------------------------
    // Use tracking
    // -------------------------------------------------------------------------

    /// Note that `name` was used by a query; only the first use counts.
    pub fn record_use(&mut self, name: &str) {
        if !self.ingredient_order.iter().any(|n| n == name) {
            self.ingredient_order.push(name.to_string());
        }
    }

    /// Store `ingredient` under its own id and record the use.
    pub fn use_ingredient(&mut self, ingredient: &Ingredient) {
        let id = ingredient.id.clone();
        self.record_use(&id);
        self.insert(&id, ingredient);
    }

    fn ranked_ids(&self, family: Family) -> Vec<String> {
        let mut ids: Vec<&Ingredient> = self
            .ingredients
            .values()
            .filter(|i| i.family() == family)
            .collect();
        ids.sort_by_key(|i| {
            self.ingredient_order
                .iter()
                .position(|n| *n == i.id)
                .unwrap_or(usize::MAX)
        });
        ids.into_iter().map(|i| i.id.clone()).collect()
    }

    /// Dimension ids in first-use order; unused ones last.
    pub fn dimension_ids(&self) -> Vec<String> {
        self.ranked_ids(Family::Dimension)
    }

    /// Metric ids in first-use order; unused ones last.
    pub fn metric_ids(&self) -> Vec<String> {
        self.ranked_ids(Family::Metric)
    }

    // -------------------------------------------------------------------------
    // Compilation
    // -------------------------------------------------------------------------

    /// Accumulate columns, group-bys and the union of filters and havings.
    pub fn compile_parts(&self) -> RecipeResult<ShelfParts> {
        let mut parts = ShelfParts::default();
        let mut seen_filters = HashSet::new();
        let mut seen_havings = HashSet::new();

        for ingredient in self.ingredients.values() {
            parts.columns.extend(ingredient.query_columns()?);
            parts.group_bys.extend(ingredient.group_by.iter().cloned());
            for filter in &ingredient.filters {
                if seen_filters.insert(filter.to_sql(Dialect::default())) {
                    parts.filters.push(filter.clone());
                }
            }
            for having in &ingredient.havings {
                if seen_havings.insert(having.to_sql(Dialect::default())) {
                    parts.havings.push(having.clone());
                }
            }
        }
        Ok(parts)
    }
}

pub(crate) fn describe_ref(reference: &IngredientRef) -> String {
    match reference {
        IngredientRef::Name(name) => name.clone(),
        IngredientRef::Ingredient(ingredient) => ingredient.id.clone(),
        IngredientRef::Expr(expr) => expr.to_sql(Dialect::default()),
        IngredientRef::Spec(spec) => serde_yaml::to_string(spec)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| "<spec>".to_string()),
    }
}

impl fmt::Display for Shelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ingredient) in self.ingredients.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", ingredient.describe())?;
        }
        Ok(())
    }
}
