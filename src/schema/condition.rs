//! Condition descriptors: comparison leaves and `and`/`or` trees.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::field::FieldDescriptor;
use crate::value::Value;

/// Internal comparison vocabulary, decoupled from the surface keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
    NotEqual,
    In,
    NotIn,
    Between,
}

impl ComparisonOp {
    /// Every surface key, aliases included.
    pub const KEYS: [&'static str; 11] = [
        "gt", "gte", "ge", "lt", "lte", "le", "eq", "ne", "in", "notin", "between",
    ];

    pub fn from_key(key: &str) -> Option<ComparisonOp> {
        match key {
            "gt" => Some(ComparisonOp::GreaterThan),
            "gte" | "ge" => Some(ComparisonOp::GreaterOrEqual),
            "lt" => Some(ComparisonOp::LessThan),
            "lte" | "le" => Some(ComparisonOp::LessOrEqual),
            "eq" => Some(ComparisonOp::Equal),
            "ne" => Some(ComparisonOp::NotEqual),
            "in" => Some(ComparisonOp::In),
            "notin" => Some(ComparisonOp::NotIn),
            "between" => Some(ComparisonOp::Between),
            _ => None,
        }
    }

    /// Canonical surface key.
    pub fn key(&self) -> &'static str {
        match self {
            ComparisonOp::GreaterThan => "gt",
            ComparisonOp::GreaterOrEqual => "gte",
            ComparisonOp::LessThan => "lt",
            ComparisonOp::LessOrEqual => "lte",
            ComparisonOp::Equal => "eq",
            ComparisonOp::NotEqual => "ne",
            ComparisonOp::In => "in",
            ComparisonOp::NotIn => "notin",
            ComparisonOp::Between => "between",
        }
    }

    /// Set operators take a list operand.
    pub fn is_set_op(&self) -> bool {
        matches!(
            self,
            ComparisonOp::In | ComparisonOp::NotIn | ComparisonOp::Between
        )
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Scalar(Value),
    List(Vec<Value>),
}

impl Operand {
    pub fn is_list(&self) -> bool {
        matches!(self, Operand::List(_))
    }

    /// The operand as a list; a scalar becomes a one-element list.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Operand::Scalar(v) => vec![v],
            Operand::List(vs) => vs,
        }
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Scalar(v)
    }
}

impl From<Vec<Value>> for Operand {
    fn from(vs: Vec<Value>) -> Self {
        Operand::List(vs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    pub fn key(&self) -> &'static str {
        match self {
            Combinator::And => "and",
            Combinator::Or => "or",
        }
    }
}

/// A validated condition. Children are evaluated in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Leaf {
        field: FieldDescriptor,
        op: ComparisonOp,
        operand: Operand,
    },
    Composite {
        combinator: Combinator,
        children: Vec<Condition>,
    },
}

impl Condition {
    /// Build a leaf; set operators get their operand coerced to a list.
    pub fn leaf(field: FieldDescriptor, op: ComparisonOp, operand: impl Into<Operand>) -> Self {
        let operand = operand.into();
        let operand = if op.is_set_op() {
            Operand::List(operand.into_list())
        } else {
            operand
        };
        Condition::Leaf { field, op, operand }
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::Composite {
            combinator: Combinator::And,
            children,
        }
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Composite {
            combinator: Combinator::Or,
            children,
        }
    }

    pub fn referenced_columns(&self) -> Vec<&str> {
        match self {
            Condition::Leaf { field, .. } => field.referenced_columns(),
            Condition::Composite { children, .. } => {
                children.iter().flat_map(|c| c.referenced_columns()).collect()
            }
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(match self {
            Condition::Leaf { .. } => 2,
            Condition::Composite { .. } => 1,
        }))?;
        match self {
            Condition::Leaf { field, op, operand } => {
                map.serialize_entry("field", field)?;
                map.serialize_entry(op.key(), operand)?;
            }
            Condition::Composite {
                combinator,
                children,
            } => {
                map.serialize_entry(combinator.key(), children)?;
            }
        }
        map.end()
    }
}
