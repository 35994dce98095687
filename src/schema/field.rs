//! Field descriptors: the normalized form of a field string or mapping.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::condition::Condition;
use crate::sql::DataType;
use crate::value::Value;

// =============================================================================
// Aggregation
// =============================================================================

/// Reducing (or bucketing) function applied to a field's expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Sum,
    Min,
    Max,
    Avg,
    Count,
    CountDistinct,
    Month,
    Week,
    Year,
    Quarter,
    Age,
    None,
}

impl Aggregation {
    pub const ALL: [Aggregation; 12] = [
        Aggregation::Sum,
        Aggregation::Min,
        Aggregation::Max,
        Aggregation::Avg,
        Aggregation::Count,
        Aggregation::CountDistinct,
        Aggregation::Month,
        Aggregation::Week,
        Aggregation::Year,
        Aggregation::Quarter,
        Aggregation::Age,
        Aggregation::None,
    ];

    /// Case-insensitive keyword lookup.
    pub fn from_keyword(s: &str) -> Option<Aggregation> {
        let lower = s.to_ascii_lowercase();
        Self::ALL.into_iter().find(|a| a.keyword() == lower)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Avg => "avg",
            Aggregation::Count => "count",
            Aggregation::CountDistinct => "count_distinct",
            Aggregation::Month => "month",
            Aggregation::Week => "week",
            Aggregation::Year => "year",
            Aggregation::Quarter => "quarter",
            Aggregation::Age => "age",
            Aggregation::None => "none",
        }
    }

    /// True for the functions that collapse rows (as opposed to date bucketing).
    pub fn is_reducing(&self) -> bool {
        matches!(
            self,
            Aggregation::Sum
                | Aggregation::Min
                | Aggregation::Max
                | Aggregation::Avg
                | Aggregation::Count
                | Aggregation::CountDistinct
        )
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl Serialize for Aggregation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.keyword())
    }
}

// =============================================================================
// Arithmetic operators
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    /// Accepts the symbol or its word alias (`add`, `sub`, `mul`, `div`).
    pub fn parse(s: &str) -> Option<ArithOp> {
        match s.trim().to_ascii_lowercase().as_str() {
            "+" | "add" => Some(ArithOp::Add),
            "-" | "sub" => Some(ArithOp::Sub),
            "*" | "mul" => Some(ArithOp::Mul),
            "/" | "div" => Some(ArithOp::Div),
            _ => None,
        }
    }

    pub fn from_char(c: char) -> Option<ArithOp> {
        match c {
            '+' => Some(ArithOp::Add),
            '-' => Some(ArithOp::Sub),
            '*' => Some(ArithOp::Mul),
            '/' => Some(ArithOp::Div),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

impl Serialize for ArithOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

// =============================================================================
// Field descriptor
// =============================================================================

/// One `<op> <field>` term of an operator chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorTerm {
    pub operator: ArithOp,
    pub field: FieldDescriptor,
}

/// A validated field.
///
/// Serializes back to the mapping form accepted by
/// [`SchemaValidator::validate_field`](super::SchemaValidator::validate_field),
/// so validating the serialized form again yields an equal descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub value: String,
    pub aggregation: Aggregation,
    pub operators: Vec<OperatorTerm>,
    pub cast_as: Option<DataType>,
    pub default: Option<Value>,
    pub condition: Option<Box<Condition>>,
    pub is_literal: bool,
}

impl FieldDescriptor {
    pub fn new(value: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            value: value.into(),
            aggregation,
            operators: Vec::new(),
            cast_as: None,
            default: None,
            condition: None,
            is_literal: false,
        }
    }

    pub fn with_operator(mut self, operator: ArithOp, field: FieldDescriptor) -> Self {
        self.operators.push(OperatorTerm { operator, field });
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(Box::new(condition));
        self
    }

    pub fn with_cast(mut self, data_type: DataType) -> Self {
        self.cast_as = Some(data_type);
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Every column name this field reads, including operator terms and
    /// the field-level condition.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if !self.is_literal {
            out.push(self.value.as_str());
        }
        for term in &self.operators {
            out.extend(term.field.referenced_columns());
        }
        if let Some(cond) = &self.condition {
            out.extend(cond.referenced_columns());
        }
        out
    }
}

impl Serialize for FieldDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("value", &self.value)?;
        map.serialize_entry("aggregation", &self.aggregation)?;
        if !self.operators.is_empty() {
            map.serialize_entry("operators", &self.operators)?;
        }
        if let Some(dt) = &self.cast_as {
            map.serialize_entry("as", dt)?;
        }
        if let Some(default) = &self.default {
            map.serialize_entry("default", default)?;
        }
        if let Some(cond) = &self.condition {
            map.serialize_entry("condition", cond)?;
        }
        if self.is_literal {
            map.serialize_entry("_use_raw_value", &true)?;
        }
        map.end()
    }
}
