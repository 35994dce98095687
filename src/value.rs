//! Scalar values: field defaults, condition operands, result cells and
//! formatter inputs/outputs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use crate::sql::expr::{lit_bool, lit_float, lit_int, lit_null, lit_str, Expr};

/// A scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Convert a YAML scalar. Sequences, mappings and tagged values yield `None`.
    pub fn from_yaml(raw: &YamlValue) -> Option<Value> {
        match raw {
            YamlValue::Null => Some(Value::Null),
            YamlValue::Bool(b) => Some(Value::Bool(*b)),
            YamlValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            YamlValue::String(s) => Some(Value::Str(s.clone())),
            YamlValue::Sequence(_) | YamlValue::Mapping(_) | YamlValue::Tagged(_) => None,
        }
    }

    pub fn to_yaml(&self) -> YamlValue {
        match self {
            Value::Null => YamlValue::Null,
            Value::Bool(b) => YamlValue::Bool(*b),
            Value::Int(i) => YamlValue::Number((*i).into()),
            Value::Float(f) => YamlValue::Number((*f).into()),
            Value::Str(s) => YamlValue::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value; strings are not coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The literal expression for this value.
    pub fn to_expr(&self) -> Expr {
        match self {
            Value::Null => lit_null(),
            Value::Bool(b) => lit_bool(*b),
            Value::Int(i) => lit_int(*i),
            Value::Float(f) => lit_float(*f),
            Value::Str(s) => lit_str(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
