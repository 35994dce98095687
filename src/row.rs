//! Result rows: an ordered tuple of named values.

use std::sync::Arc;

use crate::value::Value;

/// A fetched (or enchanted) result row.
///
/// Rows from the same result share one field-name list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row; missing trailing values read as absent.
    pub fn new(fields: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { fields, values }
    }

    /// Build a row from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (fields, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            fields: fields.into(),
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        let idx = self.fields.iter().position(|f| f == field)?;
        self.values.get(idx)
    }

    pub fn fields(&self) -> &Arc<[String]> {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(String::as_str).zip(self.values.iter())
    }
}
