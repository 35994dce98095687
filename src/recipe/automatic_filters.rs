//! Filters built from a key → values mapping.
//!
//! Each key names a dimension on the shelf, optionally followed by
//! `__<operator>` (`state__notin`). The dimension's `build_filter` turns the
//! values into a filter ingredient which joins the working cauldron.

use std::any::Any;
use std::collections::BTreeMap;

use tracing::trace;

use super::extension::Extension;
use crate::error::RecipeResult;
use crate::ingredient::Family;
use crate::schema::Operand;
use crate::shelf::Shelf;

#[derive(Debug, Clone)]
pub struct AutomaticFilters {
    apply: bool,
    filters: BTreeMap<String, Operand>,
    include_keys: Option<Vec<String>>,
    exclude_keys: Option<Vec<String>>,
    dirty: bool,
}

impl Default for AutomaticFilters {
    fn default() -> Self {
        Self {
            apply: true,
            filters: BTreeMap::new(),
            include_keys: None,
            exclude_keys: None,
            dirty: true,
        }
    }
}

impl AutomaticFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, key: &str, values: impl Into<Operand>) -> Self {
        self.add_filter(key, values);
        self
    }

    pub fn add_filter(&mut self, key: &str, values: impl Into<Operand>) {
        self.filters.insert(key.to_string(), values.into());
        self.dirty = true;
    }

    /// Replace the whole mapping.
    pub fn set_filters(&mut self, filters: BTreeMap<String, Operand>) {
        self.filters = filters;
        self.dirty = true;
    }

    pub fn filters(&self) -> &BTreeMap<String, Operand> {
        &self.filters
    }

    pub fn set_apply(&mut self, apply: bool) {
        if self.apply != apply {
            self.apply = apply;
            self.dirty = true;
        }
    }

    /// Only keys whose dimension is listed are applied.
    pub fn include_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_keys = Some(keys.into_iter().map(Into::into).collect());
        self.dirty = true;
    }

    /// Keys whose dimension is listed are skipped.
    pub fn exclude_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_keys = Some(keys.into_iter().map(Into::into).collect());
        self.dirty = true;
    }

    fn wanted(&self, dimension: &str) -> bool {
        let included = self
            .include_keys
            .as_ref()
            .map_or(true, |keys| keys.iter().any(|k| k == dimension));
        let excluded = self
            .exclude_keys
            .as_ref()
            .is_some_and(|keys| keys.iter().any(|k| k == dimension));
        included && !excluded
    }
}

impl Extension for AutomaticFilters {
    fn name(&self) -> &str {
        "automatic_filters"
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn add_ingredients(&mut self, shelf: &Shelf, cauldron: &mut Shelf) -> RecipeResult<()> {
        if !self.apply {
            return Ok(());
        }
        for (key, values) in &self.filters {
            let (dimension, operator) = match key.split_once("__") {
                Some((dimension, operator)) => (dimension, Some(operator)),
                None => (key.as_str(), None),
            };
            if !self.wanted(dimension) {
                trace!(key = %key, "automatic filter skipped");
                continue;
            }
            let dimension = shelf.resolve(dimension, &[Family::Dimension])?;
            let filter = dimension.build_filter(values.clone(), operator)?;
            trace!(filter = %filter.id, "automatic filter added");
            cauldron.use_ingredient(&filter);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
