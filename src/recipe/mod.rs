//! Recipes: select ingredients from a shelf and compile them into a query.
//!
//! A recipe is dirty after any setter and clean after compiling. The compiled
//! query (and the rows fetched with it) are reused while the recipe and every
//! extension stay clean.
//!
//! ```text
//! setters ──> cauldron ──> add_ingredients ──> compile_parts + order-bys
//!                                                   │ modify_recipe_parts
//!                                                   v
//!              limit/offset <── postquery <── table check <── prequery
//! ```

mod anonymize;
mod automatic_filters;
mod extension;
mod session;
mod stats;

pub use anonymize::Anonymize;
pub use automatic_filters::AutomaticFilters;
pub use extension::{Extension, QueryParts, RecipeParts};
pub use session::{Session, SessionError};
pub use stats::Stats;

use std::collections::HashSet;
use std::time::Instant;

use serde_yaml::{Mapping, Value as YamlValue};
use tracing::{debug, info_span, trace};

use crate::cache::CacheKey;
use crate::config::Settings;
use crate::error::{BadRecipe, RecipeResult};
use crate::ingredient::{ExpressionBuilder, Family, Ingredient, DEFAULT_EPSILON};
use crate::row::Row;
use crate::schema::{FieldContext, SchemaConfig, SchemaValidator};
use crate::shelf::{describe_ref, IngredientRef, Shelf};
use crate::sql::{Dialect, OrderByExpr, Query};

/// Keys accepted by [`Recipe::configure`].
pub const CONFIG_KEYS: [&str; 6] = ["metrics", "dimensions", "filters", "order_by", "limit", "offset"];

#[derive(Debug, Clone)]
struct Compiled {
    query: Query,
    /// The selected ingredients plus whatever extensions added.
    cauldron: Shelf,
}

#[derive(Debug)]
pub struct Recipe {
    shelf: Shelf,
    cauldron: Shelf,
    order_bys: Vec<Ingredient>,
    limit: u64,
    offset: u64,
    dialect: Dialect,
    schema: SchemaConfig,
    epsilon: f64,
    extensions: Vec<Box<dyn Extension>>,
    dirty: bool,
    compiled: Option<Compiled>,
    results: Option<Vec<Row>>,
    stats: Option<Stats>,
}

impl Recipe {
    pub fn new(shelf: Shelf) -> Self {
        let cauldron = shelf.empty_like();
        Self {
            shelf,
            cauldron,
            order_bys: Vec::new(),
            limit: 0,
            offset: 0,
            dialect: Dialect::default(),
            schema: SchemaConfig::default(),
            epsilon: DEFAULT_EPSILON,
            extensions: Vec::new(),
            dirty: true,
            compiled: None,
            results: None,
            stats: None,
        }
    }

    /// A recipe using the dialect, anonymize policy and schema defaults
    /// from `settings`.
    pub fn with_settings(mut shelf: Shelf, settings: &Settings) -> RecipeResult<Self> {
        if settings.recipe.anonymize {
            shelf.set_anonymize(true);
        }
        let mut recipe = Recipe::new(shelf);
        recipe.dialect = settings.recipe.dialect;
        recipe.schema = settings.schema_config()?;
        recipe.epsilon = settings.divide.epsilon;
        Ok(recipe)
    }

    /// A recipe built from a mapping with the [`CONFIG_KEYS`].
    pub fn from_config(shelf: Shelf, raw: &YamlValue) -> RecipeResult<Self> {
        Recipe::new(shelf).configure(raw)
    }

    pub fn from_yaml(shelf: Shelf, text: &str) -> RecipeResult<Self> {
        let raw: YamlValue = serde_yaml::from_str(text)?;
        Self::from_config(shelf, &raw)
    }

    /// Apply the [`CONFIG_KEYS`] of `raw` through the matching setters.
    pub fn configure(self, raw: &YamlValue) -> RecipeResult<Self> {
        let mapping = raw
            .as_mapping()
            .ok_or_else(|| BadRecipe::InvalidConfig("recipe must be a mapping".to_string()))?;
        for key in mapping.keys() {
            match key.as_str() {
                Some(k) if CONFIG_KEYS.contains(&k) => {}
                Some(k) => return Err(BadRecipe::InvalidConfig(format!("unknown key '{}'", k)).into()),
                None => return Err(BadRecipe::InvalidConfig(format!("unknown key {:?}", key)).into()),
            }
        }

        let mut recipe = self
            .metrics(config_names(mapping, "metrics")?)?
            .dimensions(config_names(mapping, "dimensions")?)?
            .filters(config_filters(mapping)?)?;
        if mapping.contains_key("order_by") {
            recipe = recipe.order_by(config_names(mapping, "order_by")?)?;
        }
        if let Some(limit) = config_count(mapping, "limit")? {
            recipe = recipe.limit(limit);
        }
        if let Some(offset) = config_count(mapping, "offset")? {
            recipe = recipe.offset(offset);
        }
        Ok(recipe)
    }

    // -------------------------------------------------------------------------
    // Setters
    // -------------------------------------------------------------------------

    pub fn metrics<I, R>(mut self, metrics: I) -> RecipeResult<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<IngredientRef>,
    {
        for metric in metrics {
            let ingredient = self.shelf.resolve(metric, &[Family::Metric])?;
            self.cauldron.use_ingredient(&ingredient);
        }
        self.dirty = true;
        Ok(self)
    }

    pub fn dimensions<I, R>(mut self, dimensions: I) -> RecipeResult<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<IngredientRef>,
    {
        for dimension in dimensions {
            let ingredient = self.shelf.resolve(dimension, &[Family::Dimension])?;
            self.cauldron.use_ingredient(&ingredient);
        }
        self.dirty = true;
        Ok(self)
    }

    /// Additive. Expressions become filters; condition mappings are
    /// validated and built against the shelf's table.
    pub fn filters<I, R>(mut self, filters: I) -> RecipeResult<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<IngredientRef>,
    {
        for filter in filters {
            let schema = &self.schema;
            let epsilon = self.epsilon;
            let ingredient = self.shelf.resolve_with(filter, &[Family::Filter, Family::Having], |reference, shelf| {
                construct_filter(reference, shelf, schema, epsilon)
            })?;
            self.cauldron.use_ingredient(&ingredient);
        }
        self.dirty = true;
        Ok(self)
    }

    /// Replaces any previous ordering. A `-` prefix orders descending.
    pub fn order_by<I, R>(mut self, order_bys: I) -> RecipeResult<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<IngredientRef>,
    {
        let resolved = order_bys
            .into_iter()
            .map(|o| self.shelf.resolve(o, &[Family::Dimension, Family::Metric]))
            .collect::<RecipeResult<Vec<_>>>()?;
        self.order_bys = resolved;
        self.dirty = true;
        Ok(self)
    }

    /// Zero returns every row.
    pub fn limit(mut self, limit: u64) -> Self {
        if self.limit != limit {
            self.limit = limit;
            self.dirty = true;
        }
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        if self.offset != offset {
            self.offset = offset;
            self.dirty = true;
        }
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        if self.dialect != dialect {
            self.dialect = dialect;
            self.dirty = true;
        }
        self
    }

    /// Extensions run in the order they were added.
    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self.dirty = true;
        self
    }

    pub fn extension_ref<E: Extension + 'static>(&self) -> Option<&E> {
        self.extensions
            .iter()
            .find_map(|e| e.as_any().downcast_ref::<E>())
    }

    pub fn extension_mut<E: Extension + 'static>(&mut self) -> Option<&mut E> {
        self.extensions
            .iter_mut()
            .find_map(|e| e.as_any_mut().downcast_mut::<E>())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn shelf(&self) -> &Shelf {
        &self.shelf
    }

    /// Ingredients selected through the setters.
    pub fn cauldron(&self) -> &Shelf {
        &self.cauldron
    }

    pub fn current_dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn metric_ids(&self) -> Vec<String> {
        self.cauldron.metric_ids()
    }

    pub fn dimension_ids(&self) -> Vec<String> {
        self.cauldron.dimension_ids()
    }

    pub fn filter_ids(&self) -> Vec<String> {
        self.cauldron
            .ingredients()
            .filter(|i| i.family() == Family::Filter)
            .map(|i| i.id.clone())
            .collect()
    }

    /// The recipe, or any of its extensions, changed since the last compile.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.extensions.iter().any(|e| e.is_dirty())
    }

    // -------------------------------------------------------------------------
    // Compilation
    // -------------------------------------------------------------------------

    /// The compiled query, rebuilt only when dirty.
    pub fn query(&mut self) -> RecipeResult<&Query> {
        Ok(&self.compiled()?.query)
    }

    pub fn to_sql(&mut self) -> RecipeResult<String> {
        let dialect = self.dialect;
        Ok(self.query()?.to_sql(dialect))
    }

    /// SHA-256 of the compiled SQL and its dialect.
    pub fn cache_key(&mut self) -> RecipeResult<String> {
        let sql = self.to_sql()?;
        Ok(CacheKey::new(sql, self.dialect).digest()?)
    }

    fn compiled(&mut self) -> RecipeResult<&Compiled> {
        let compiled = match self.compiled.take() {
            Some(compiled) if !self.is_dirty() => compiled,
            _ => {
                let compiled = self.build()?;
                self.dirty = false;
                for extension in &mut self.extensions {
                    extension.mark_clean();
                }
                self.results = None;
                compiled
            }
        };
        Ok(self.compiled.insert(compiled))
    }

    fn build(&mut self) -> RecipeResult<Compiled> {
        if self.cauldron.is_empty() {
            return Err(BadRecipe::NoIngredients.into());
        }

        let mut cauldron = self.cauldron.clone();
        for extension in &mut self.extensions {
            trace!(extension = extension.name(), "add_ingredients");
            extension.add_ingredients(&self.shelf, &mut cauldron)?;
        }

        let shelf_parts = cauldron.compile_parts()?;
        let mut parts = RecipeParts {
            columns: shelf_parts.columns,
            group_bys: shelf_parts.group_bys,
            filters: shelf_parts.filters,
            havings: shelf_parts.havings,
            order_bys: self.prepare_order_bys(),
        };
        for extension in &mut self.extensions {
            trace!(extension = extension.name(), "modify_recipe_parts");
            parts = extension.modify_recipe_parts(parts)?;
        }
        debug!(
            columns = parts.columns.len(),
            filters = parts.filters.len(),
            havings = parts.havings.len(),
            "gathered recipe parts"
        );

        let mut query = Query::new()
            .select(parts.columns)
            .from(self.shelf.selectable().table().clone())
            .group_by(parts.group_bys.clone())
            .order_by(parts.order_bys.clone());
        for filter in &parts.filters {
            query = query.filter(filter.clone());
        }
        for having in &parts.havings {
            query = query.having(having.clone());
        }

        let mut query_parts = QueryParts {
            query,
            group_bys: parts.group_bys,
            filters: parts.filters,
            havings: parts.havings,
            order_bys: parts.order_bys,
        };
        for extension in &mut self.extensions {
            trace!(extension = extension.name(), "modify_prequery_parts");
            query_parts = extension.modify_prequery_parts(query_parts)?;
        }

        let tables = query_parts.query.referenced_tables();
        match tables.len() {
            0 => return Err(BadRecipe::NoTable.into()),
            1 => {}
            _ => return Err(BadRecipe::MultipleTables(tables.into_iter().collect()).into()),
        }

        for extension in &mut self.extensions {
            trace!(extension = extension.name(), "modify_postquery_parts");
            query_parts = extension.modify_postquery_parts(query_parts)?;
        }

        let mut query = query_parts.query;
        if self.limit > 0 {
            query = query.limit(self.limit);
        }
        if self.offset > 0 {
            query = query.offset(self.offset);
        }

        debug!(sql = %query.to_sql(self.dialect), "compiled recipe");
        Ok(Compiled { query, cauldron })
    }

    /// Order-by columns of every ordering ingredient, first occurrence wins.
    fn prepare_order_bys(&self) -> Vec<OrderByExpr> {
        let mut seen = HashSet::new();
        let mut order_bys = Vec::new();
        for ingredient in &self.order_bys {
            for order_by in ingredient.order_by_columns() {
                if seen.insert(order_by.to_sql(self.dialect)) {
                    order_bys.push(order_by);
                }
            }
        }
        order_bys
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Fetch and enchant the rows. Results are reused until the recipe
    /// becomes dirty.
    pub fn all<S: Session + ?Sized>(&mut self, session: &mut S) -> RecipeResult<&[Row]> {
        let span = info_span!("recipe_all", dialect = ?self.dialect);
        let _enter = span.enter();

        if self.is_dirty() || self.results.is_none() {
            let start = Instant::now();
            let dialect = self.dialect;
            let compiled = self.compiled()?;
            let rows = session.fetch(&compiled.query, dialect)?;
            let fetched = Instant::now();
            let rows = compiled.cauldron.enchant(rows)?;
            let enchanted = Instant::now();

            self.stats = Some(Stats {
                rows: rows.len(),
                db_time: fetched - start,
                enchant_time: enchanted - fetched,
                from_cache: false,
            });
            self.results = Some(rows);
        } else {
            let rows = self.results.as_ref().map_or(0, Vec::len);
            debug!(rows, "serving cached rows");
            self.stats = Some(Stats {
                rows,
                from_cache: true,
                ..Stats::default()
            });
        }
        Ok(self.results.as_deref().unwrap_or_default())
    }

    pub fn first<S: Session + ?Sized>(&mut self, session: &mut S) -> RecipeResult<Option<Row>> {
        Ok(self.all(session)?.first().cloned())
    }

    pub fn stats(&self) -> RecipeResult<Stats> {
        self.stats.ok_or_else(|| BadRecipe::StatsNotReady.into())
    }
}

fn construct_filter(
    reference: IngredientRef,
    shelf: &Shelf,
    schema: &SchemaConfig,
    epsilon: f64,
) -> RecipeResult<Ingredient> {
    let predicate = match reference {
        IngredientRef::Expr(expr) => expr,
        IngredientRef::Spec(raw) => {
            let validator = SchemaValidator::new(schema.clone());
            let condition = validator
                .validate_condition(&raw, FieldContext::NonAggregated)?
                .ok_or_else(|| BadRecipe::InvalidConfig("filter condition is empty".to_string()))?;
            ExpressionBuilder::new(shelf.selectable())
                .with_epsilon(epsilon)
                .condition(&condition)?
        }
        other => return Err(BadRecipe::NeedsConstructor(describe_ref(&other)).into()),
    };
    let id = predicate.to_sql(Dialect::default());
    Ok(Ingredient::filter(predicate).with_id(&id))
}

fn config_names(mapping: &Mapping, key: &str) -> RecipeResult<Vec<String>> {
    let invalid = || BadRecipe::InvalidConfig(format!("'{}' must be a name or a list of names", key));
    match mapping.get(key) {
        None | Some(YamlValue::Null) => Ok(Vec::new()),
        Some(YamlValue::String(name)) => Ok(vec![name.clone()]),
        Some(YamlValue::Sequence(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect::<Result<_, _>>()
            .map_err(Into::into),
        Some(_) => Err(invalid().into()),
    }
}

fn config_filters(mapping: &Mapping) -> RecipeResult<Vec<IngredientRef>> {
    let single = |item: &YamlValue| -> RecipeResult<IngredientRef> {
        match item {
            YamlValue::String(name) => Ok(IngredientRef::Name(name.clone())),
            YamlValue::Mapping(_) => Ok(IngredientRef::Spec(item.clone())),
            _ => Err(BadRecipe::InvalidConfig("filters must be names or condition mappings".to_string()).into()),
        }
    };
    match mapping.get("filters") {
        None | Some(YamlValue::Null) => Ok(Vec::new()),
        Some(YamlValue::Sequence(items)) => items.iter().map(single).collect(),
        Some(item) => Ok(vec![single(item)?]),
    }
}

fn config_count(mapping: &Mapping, key: &str) -> RecipeResult<Option<u64>> {
    match mapping.get(key) {
        None | Some(YamlValue::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| BadRecipe::InvalidConfig(format!("'{}' must be a non-negative integer", key)).into()),
    }
}
