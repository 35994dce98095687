//! Value formatters applied to raw result values during enchantment.

use std::fmt;
use std::sync::Arc;

use serde_yaml::Value as YamlValue;
use thiserror::Error;

use crate::error::BadIngredient;
use crate::value::Value;

/// Value used for keys missing from a lookup table.
pub const DEFAULT_LOOKUP_MISS: &str = "Not found";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("row has no field '{0}'")]
    MissingField(String),

    #[error("formatter '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

/// A raw-value to display-value mapping with a fallback for misses.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    entries: Vec<(Value, Value)>,
    default: Value,
}

impl LookupTable {
    pub fn new(entries: Vec<(Value, Value)>, default: Value) -> Self {
        Self { entries, default }
    }

    /// Build from a YAML mapping of scalars.
    pub fn from_yaml(id: &str, raw: &YamlValue, default: Option<Value>) -> Result<Self, BadIngredient> {
        let map = raw
            .as_mapping()
            .ok_or_else(|| BadIngredient::LookupNotMapping(id.to_string()))?;
        let entries = map
            .iter()
            .map(|(k, v)| match (Value::from_yaml(k), Value::from_yaml(v)) {
                (Some(k), Some(v)) => Ok((k, v)),
                _ => Err(BadIngredient::LookupNotMapping(id.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            entries,
            default: default.unwrap_or_else(|| Value::from(DEFAULT_LOOKUP_MISS)),
        })
    }

    /// Look up `key`; integers and floats with equal value match each other.
    pub fn get(&self, key: &Value) -> Value {
        self.entries
            .iter()
            .find(|(k, _)| k == key || matches!((k.as_f64(), key.as_f64()), (Some(a), Some(b)) if a == b))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type FormatFn = dyn Fn(&Value) -> Result<Value, FormatError> + Send + Sync;

/// A formatter in an ingredient's chain.
#[derive(Clone)]
pub enum Formatter {
    Lookup(LookupTable),
    Custom { name: String, func: Arc<FormatFn> },
}

impl Formatter {
    pub fn custom<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, FormatError> + Send + Sync + 'static,
    {
        Formatter::Custom {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Formatter::Lookup(_) => "lookup",
            Formatter::Custom { name, .. } => name,
        }
    }

    pub fn apply(&self, value: &Value) -> Result<Value, FormatError> {
        match self {
            Formatter::Lookup(table) => Ok(table.get(value)),
            Formatter::Custom { func, .. } => func(value),
        }
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formatter::Lookup(table) => f.debug_tuple("Lookup").field(table).finish(),
            Formatter::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}
