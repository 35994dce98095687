//! Recursive validation and normalization of field and condition mappings.
//!
//! Input arrives as already-parsed `serde_yaml::Value` trees. A field is a
//! string (handed to the field parser) or a mapping:
//!
//! ```yaml
//! value: age
//! aggregation: sum
//! operators: [{operator: "+", field: bonus}]
//! as: float
//! default: 0
//! condition: {field: state, in: [VT, NH]}
//! ```
//!
//! A condition is a leaf (`field` plus exactly one comparison key) or a
//! composite (`and`/`or` mapping to a list of conditions).

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value as YamlValue};

use super::condition::{ComparisonOp, Condition, Operand};
use super::error::{join_path, SchemaError, SchemaResult};
use super::field::{Aggregation, ArithOp, FieldDescriptor, OperatorTerm};
use super::parser::{is_number, parse_field_at};
use crate::sql::DataType;
use crate::value::Value;

const FIELD_KEYS: [&str; 7] = [
    "value",
    "aggregation",
    "operators",
    "as",
    "default",
    "condition",
    "_use_raw_value",
];

// =============================================================================
// Configuration
// =============================================================================

/// Named number formats available to every validator.
pub fn builtin_formats() -> BTreeMap<String, String> {
    [
        ("comma", ",.0f"),
        ("dollar", "$,.0f"),
        ("percent", ".0%"),
        ("comma1", ",.1f"),
        ("dollar1", "$,.1f"),
        ("percent1", ".1%"),
        ("comma2", ",.2f"),
        ("dollar2", "$,.2f"),
        ("percent2", ".2%"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Validator configuration: format names, the cast allow-list and the
/// aggregation used when an aggregated field does not name one.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaConfig {
    pub formats: BTreeMap<String, String>,
    /// `None` accepts every known datatype.
    pub datatypes: Option<Vec<DataType>>,
    pub default_aggregation: Aggregation,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            formats: builtin_formats(),
            datatypes: None,
            default_aggregation: Aggregation::Sum,
        }
    }
}

/// Whether a field feeds an aggregate (metrics, havings) or a row-level
/// expression (dimensions, filters, field conditions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContext {
    Aggregated,
    NonAggregated,
}

// =============================================================================
// Validator
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    config: SchemaConfig,
}

impl SchemaValidator {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// A validator that also knows the named format `name`.
    pub fn with_format(&self, name: &str, pattern: &str) -> Self {
        let mut config = self.config.clone();
        config.formats.insert(name.to_string(), pattern.to_string());
        Self { config }
    }

    /// A validator whose `as` key only accepts `datatypes`.
    pub fn with_datatypes(&self, datatypes: Vec<DataType>) -> Self {
        let mut config = self.config.clone();
        config.datatypes = Some(datatypes);
        Self { config }
    }

    /// Expand a named format; unknown names are literal patterns.
    pub fn resolve_format(&self, format: &str) -> String {
        self.config
            .formats
            .get(format)
            .cloned()
            .unwrap_or_else(|| format.to_string())
    }

    fn default_aggregation(&self, ctx: FieldContext) -> Aggregation {
        match ctx {
            FieldContext::Aggregated => self.config.default_aggregation,
            FieldContext::NonAggregated => Aggregation::None,
        }
    }

    pub fn validate_field(&self, raw: &YamlValue, ctx: FieldContext) -> SchemaResult<FieldDescriptor> {
        self.field_at(raw, ctx, "field")
    }

    /// Validate, then serialize back to the mapping form.
    pub fn normalize_field(&self, raw: &YamlValue, ctx: FieldContext) -> SchemaResult<YamlValue> {
        let field = self.validate_field(raw, ctx)?;
        serde_yaml::to_value(&field).map_err(|e| SchemaError::new("field", e.to_string()))
    }

    /// Validate a condition. An empty mapping (or null) is no condition.
    pub fn validate_condition(
        &self,
        raw: &YamlValue,
        ctx: FieldContext,
    ) -> SchemaResult<Option<Condition>> {
        self.condition_at(raw, ctx, "condition")
    }

    pub(crate) fn field_at(
        &self,
        raw: &YamlValue,
        ctx: FieldContext,
        path: &str,
    ) -> SchemaResult<FieldDescriptor> {
        let field = match raw {
            YamlValue::String(s) => parse_field_at(s, self.default_aggregation(ctx), path)?,
            YamlValue::Number(n) => {
                let mut field = FieldDescriptor::new(n.to_string(), self.default_aggregation(ctx));
                field.is_literal = true;
                field
            }
            YamlValue::Mapping(map) => self.field_mapping(map, ctx, path)?,
            _ => {
                return Err(SchemaError::new(
                    path,
                    "field must be a string or a mapping",
                ))
            }
        };
        check_aggregation(field.aggregation, ctx, path)?;
        Ok(field)
    }

    fn field_mapping(
        &self,
        map: &Mapping,
        ctx: FieldContext,
        path: &str,
    ) -> SchemaResult<FieldDescriptor> {
        for key in map.keys() {
            let name = key_str(key, path)?;
            if !FIELD_KEYS.contains(&name) {
                return Err(SchemaError::new(
                    join_path(path, name),
                    "unknown field key",
                ));
            }
        }

        let value = match map.get("value") {
            Some(YamlValue::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(YamlValue::Number(n)) => n.to_string(),
            Some(_) => {
                return Err(SchemaError::new(
                    join_path(path, "value"),
                    "value must be a non-empty string",
                ))
            }
            None => return Err(SchemaError::new(path, "missing required key 'value'")),
        };

        let has_aggregation = map.contains_key("aggregation");
        let aggregation = match map.get("aggregation") {
            None | Some(YamlValue::Null) => self.default_aggregation(ctx),
            Some(YamlValue::String(s)) => Aggregation::from_keyword(s.trim()).ok_or_else(|| {
                SchemaError::new(
                    join_path(path, "aggregation"),
                    format!("unknown aggregation '{}'", s),
                )
            })?,
            Some(_) => {
                return Err(SchemaError::new(
                    join_path(path, "aggregation"),
                    "aggregation must be a string",
                ))
            }
        };

        let operators = match map.get("operators") {
            None | Some(YamlValue::Null) => Vec::new(),
            Some(YamlValue::Sequence(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.operator_term(item, &join_path(&join_path(path, "operators"), &format!("[{}]", i)))
                })
                .collect::<SchemaResult<Vec<_>>>()?,
            Some(_) => {
                return Err(SchemaError::new(
                    join_path(path, "operators"),
                    "operators must be a list",
                ))
            }
        };

        let cast_as = match map.get("as") {
            None | Some(YamlValue::Null) => None,
            Some(YamlValue::String(s)) => Some(self.datatype(s, &join_path(path, "as"))?),
            Some(_) => {
                return Err(SchemaError::new(
                    join_path(path, "as"),
                    "as must name a datatype",
                ))
            }
        };

        let default = match map.get("default") {
            None => None,
            Some(raw) => match Value::from_yaml(raw) {
                Some(v) if !v.is_null() => Some(v),
                _ => {
                    return Err(SchemaError::new(
                        join_path(path, "default"),
                        "default must be an integer, float, string or boolean",
                    ))
                }
            },
        };

        let condition = match map.get("condition") {
            None => None,
            Some(raw) => self
                .condition_at(raw, FieldContext::NonAggregated, &join_path(path, "condition"))?
                .map(Box::new),
        };

        let is_literal = match map.get("_use_raw_value") {
            Some(YamlValue::Bool(b)) => *b,
            Some(_) => {
                return Err(SchemaError::new(
                    join_path(path, "_use_raw_value"),
                    "_use_raw_value must be a boolean",
                ))
            }
            None => is_number(&value) && operators.is_empty() && !has_aggregation,
        };

        Ok(FieldDescriptor {
            value,
            aggregation,
            operators,
            cast_as,
            default,
            condition,
            is_literal,
        })
    }

    fn operator_term(&self, raw: &YamlValue, path: &str) -> SchemaResult<OperatorTerm> {
        let map = raw
            .as_mapping()
            .ok_or_else(|| SchemaError::new(path, "operator entry must be a mapping"))?;
        for key in map.keys() {
            let name = key_str(key, path)?;
            if name != "operator" && name != "field" {
                return Err(SchemaError::new(join_path(path, name), "unknown operator key"));
            }
        }
        let op_path = join_path(path, "operator");
        let operator = match map.get("operator") {
            Some(YamlValue::String(s)) => ArithOp::parse(s).ok_or_else(|| {
                SchemaError::new(&op_path, format!("unknown operator '{}'", s))
            })?,
            Some(_) => return Err(SchemaError::new(op_path, "operator must be a string")),
            None => return Err(SchemaError::new(path, "missing required key 'operator'")),
        };
        let field_path = join_path(path, "field");
        let field = match map.get("field") {
            // Operator fields are bare references, never rescanned for operators.
            Some(YamlValue::String(s)) => {
                let value: String = s.chars().filter(|c| !c.is_whitespace()).collect();
                if value.is_empty() {
                    return Err(SchemaError::new(field_path, "field must not be empty"));
                }
                let mut field = FieldDescriptor::new(value, Aggregation::None);
                field.is_literal = is_number(&field.value);
                field
            }
            Some(raw) => self.field_at(raw, FieldContext::NonAggregated, &field_path)?,
            None => return Err(SchemaError::new(path, "missing required key 'field'")),
        };
        Ok(OperatorTerm { operator, field })
    }

    fn datatype(&self, name: &str, path: &str) -> SchemaResult<DataType> {
        let dt = DataType::parse(name)
            .ok_or_else(|| SchemaError::new(path, format!("unknown datatype '{}'", name)))?;
        if let Some(allowed) = &self.config.datatypes {
            if !allowed.contains(&dt) {
                return Err(SchemaError::new(
                    path,
                    format!("datatype '{}' is not allowed", dt.name()),
                ));
            }
        }
        Ok(dt)
    }

    pub(crate) fn condition_at(
        &self,
        raw: &YamlValue,
        ctx: FieldContext,
        path: &str,
    ) -> SchemaResult<Option<Condition>> {
        let map = match raw {
            YamlValue::Null => return Ok(None),
            YamlValue::Mapping(map) if map.is_empty() => return Ok(None),
            YamlValue::Mapping(map) => map,
            _ => return Err(SchemaError::new(path, "condition must be a mapping")),
        };

        for combinator in ["and", "or"] {
            let Some(children) = map.get(combinator) else {
                continue;
            };
            if map.len() != 1 {
                return Err(SchemaError::new(
                    path,
                    format!("'{}' must be the only key of a condition", combinator),
                ));
            }
            let child_path = join_path(path, combinator);
            let items = match children {
                YamlValue::Sequence(items) if !items.is_empty() => items,
                _ => {
                    return Err(SchemaError::new(
                        child_path,
                        "must be a non-empty list of conditions",
                    ))
                }
            };
            let children = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let p = join_path(&child_path, &format!("[{}]", i));
                    self.condition_at(item, ctx, &p)?
                        .ok_or_else(|| SchemaError::new(p, "condition must not be empty"))
                })
                .collect::<SchemaResult<Vec<_>>>()?;
            return Ok(Some(if combinator == "and" {
                Condition::and(children)
            } else {
                Condition::or(children)
            }));
        }

        self.leaf(map, ctx, path).map(Some)
    }

    fn leaf(&self, map: &Mapping, ctx: FieldContext, path: &str) -> SchemaResult<Condition> {
        let mut found: Option<(&str, ComparisonOp)> = None;
        for key in map.keys() {
            let name = key_str(key, path)?;
            if name == "field" {
                continue;
            }
            let op = ComparisonOp::from_key(name).ok_or_else(|| {
                SchemaError::new(join_path(path, name), "unknown condition key")
            })?;
            if let Some((first, _)) = found {
                return Err(SchemaError::new(
                    path,
                    format!("only one comparison allowed, found '{}' and '{}'", first, name),
                ));
            }
            found = Some((name, op));
        }

        let (key, op) = found.ok_or_else(|| {
            SchemaError::new(
                path,
                format!("condition needs one of {}", ComparisonOp::KEYS.join(", ")),
            )
        })?;
        let field = match map.get("field") {
            Some(raw) => self.field_at(raw, ctx, &join_path(path, "field"))?,
            None => return Err(SchemaError::new(path, "missing required key 'field'")),
        };

        let op_path = join_path(path, key);
        let null = YamlValue::Null;
        let raw = map.get(key).unwrap_or(&null);
        let operand = if op.is_set_op() {
            let values = match raw {
                YamlValue::Sequence(items) => items
                    .iter()
                    .map(|item| scalar(item, &op_path))
                    .collect::<SchemaResult<Vec<_>>>()?,
                other => vec![scalar(other, &op_path)?],
            };
            if op == ComparisonOp::Between && values.len() != 2 {
                return Err(SchemaError::new(
                    op_path,
                    "between requires exactly two values",
                ));
            }
            Operand::List(values)
        } else {
            match raw {
                YamlValue::Sequence(_) => {
                    return Err(SchemaError::new(
                        op_path,
                        format!("'{}' requires a scalar value", key),
                    ))
                }
                YamlValue::Null
                    if matches!(op, ComparisonOp::Equal | ComparisonOp::NotEqual) =>
                {
                    Operand::Scalar(Value::Null)
                }
                other => Operand::Scalar(scalar(other, &op_path)?),
            }
        };

        Ok(Condition::Leaf { field, op, operand })
    }
}

fn check_aggregation(aggregation: Aggregation, ctx: FieldContext, path: &str) -> SchemaResult<()> {
    if ctx == FieldContext::NonAggregated && aggregation.is_reducing() {
        return Err(SchemaError::new(
            join_path(path, "aggregation"),
            format!(
                "aggregation '{}' is not allowed in a non-aggregated field",
                aggregation
            ),
        ));
    }
    Ok(())
}

fn key_str<'a>(key: &'a YamlValue, path: &str) -> SchemaResult<&'a str> {
    key.as_str()
        .ok_or_else(|| SchemaError::new(path, "mapping keys must be strings"))
}

fn scalar(raw: &YamlValue, path: &str) -> SchemaResult<Value> {
    match Value::from_yaml(raw) {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(SchemaError::new(
            path,
            "value must be an integer, float, string or boolean",
        )),
    }
}
