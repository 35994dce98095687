//! Result enchantment: derived fields appended to fetched rows.

use std::collections::HashSet;
use std::sync::Arc;

use super::Shelf;
use crate::ingredient::{Family, FormatError, Producer};
use crate::row::Row;

impl Shelf {
    /// Append every dimension's and metric's extra fields to each row.
    ///
    /// Extras run once per row in ingredient-then-producer order. An extra
    /// whose name is already a row field is skipped.
    pub fn enchant(&self, rows: Vec<Row>) -> Result<Vec<Row>, FormatError> {
        let Some(sample) = rows.first() else {
            return Ok(rows);
        };

        let mut names: HashSet<String> = sample.fields().iter().cloned().collect();
        let mut producers: Vec<(String, Producer<'_>)> = Vec::new();
        for ingredient in self.ingredients() {
            if !matches!(ingredient.family(), Family::Dimension | Family::Metric) {
                continue;
            }
            for (name, producer) in ingredient.cauldron_extras() {
                if names.insert(name.clone()) {
                    producers.push((name, producer));
                }
            }
        }

        let fields: Arc<[String]> = sample
            .fields()
            .iter()
            .cloned()
            .chain(producers.iter().map(|(name, _)| name.clone()))
            .collect();

        rows.into_iter()
            .map(|row| {
                let mut values = Vec::with_capacity(producers.len());
                for (_, producer) in &producers {
                    values.push(producer(&row)?);
                }
                let mut all = row.into_values();
                all.extend(values);
                Ok(Row::new(Arc::clone(&fields), all))
            })
            .collect()
    }
}
