//! Declarative shelf definitions, normalized into closed ingredient specs.
//!
//! ```yaml
//! age:
//!   kind: Metric
//!   field: sum(age)
//!   format: comma
//! state:
//!   kind: Dimension
//!   field: state
//!   id_field: state_code          # relocated to extra_fields as id_expression
//!   lookup: {VT: Vermont}
//! ```
//!
//! Legacy kinds are rewritten before validation: `IdValueDimension` becomes
//! `Dimension`, `DivideMetric` and `WtdAvgMetric` become a `Metric` with
//! `divide_by`.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value as YamlValue};

use super::condition::Condition;
use super::error::{join_path, SchemaError, SchemaResult};
use super::field::{ArithOp, FieldDescriptor};
use super::validator::{FieldContext, SchemaValidator};
use crate::value::Value;

/// A named predicate carried on an ingredient for callers to offer as a
/// one-click filter.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickfilterSpec {
    pub name: String,
    pub condition: Condition,
}

/// Keys shared by every kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonSpec {
    /// Resolved format pattern (named formats already expanded).
    pub format: Option<String>,
    pub quickfilters: Vec<QuickfilterSpec>,
    /// Keys the schema does not interpret, kept verbatim.
    pub meta: BTreeMap<String, YamlValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub field: FieldDescriptor,
    pub divide_by: Option<FieldDescriptor>,
    /// Fallback for a zero denominator; `None` adds an epsilon instead.
    pub ifzero: Option<Value>,
    pub common: CommonSpec,
}

/// An auxiliary dimension column, e.g. role `id` or `latitude`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraField {
    pub role: String,
    pub field: FieldDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSpec {
    pub field: FieldDescriptor,
    pub extra_fields: Vec<ExtraField>,
    pub lookup: Option<YamlValue>,
    pub lookup_default: Option<Value>,
    pub common: CommonSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSpec {
    pub condition: Condition,
    pub common: CommonSpec,
}

/// One validated shelf entry, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum IngredientSpec {
    Metric(MetricSpec),
    Dimension(DimensionSpec),
    Filter(ConditionSpec),
    Having(ConditionSpec),
}

impl IngredientSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            IngredientSpec::Metric(_) => "Metric",
            IngredientSpec::Dimension(_) => "Dimension",
            IngredientSpec::Filter(_) => "Filter",
            IngredientSpec::Having(_) => "Having",
        }
    }

    pub fn common(&self) -> &CommonSpec {
        match self {
            IngredientSpec::Metric(m) => &m.common,
            IngredientSpec::Dimension(d) => &d.common,
            IngredientSpec::Filter(c) | IngredientSpec::Having(c) => &c.common,
        }
    }

    /// Validate one shelf entry. `name` roots the error paths.
    pub fn from_yaml(name: &str, raw: &YamlValue, validator: &SchemaValidator) -> SchemaResult<Self> {
        let map = raw
            .as_mapping()
            .ok_or_else(|| SchemaError::new(name, "ingredient must be a mapping"))?;
        let mut map = map.clone();
        let kind = rewrite_legacy_kind(&mut map, name)?;
        match kind {
            Kind::Metric => metric(map, name, validator).map(IngredientSpec::Metric),
            Kind::Dimension => dimension(map, name, validator).map(IngredientSpec::Dimension),
            Kind::Filter => {
                condition_spec(map, name, validator, FieldContext::NonAggregated).map(IngredientSpec::Filter)
            }
            Kind::Having => {
                condition_spec(map, name, validator, FieldContext::Aggregated).map(IngredientSpec::Having)
            }
        }
    }
}

/// Validate a whole shelf mapping, keeping definition order. A top-level
/// `_version` key is ignored.
pub fn parse_shelf(raw: &YamlValue, validator: &SchemaValidator) -> SchemaResult<Vec<(String, IngredientSpec)>> {
    let map = raw
        .as_mapping()
        .ok_or_else(|| SchemaError::new("", "shelf must be a mapping of name to ingredient"))?;
    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        let name = key
            .as_str()
            .ok_or_else(|| SchemaError::new("", "ingredient names must be strings"))?;
        if name == "_version" {
            continue;
        }
        out.push((name.to_string(), IngredientSpec::from_yaml(name, value, validator)?));
    }
    Ok(out)
}

// =============================================================================
// Kind selection and legacy rewrites
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Metric,
    Dimension,
    Filter,
    Having,
}

fn rewrite_legacy_kind(map: &mut Mapping, path: &str) -> SchemaResult<Kind> {
    let kind = match map.shift_remove("kind") {
        None | Some(YamlValue::Null) => "Metric".to_string(),
        Some(YamlValue::String(s)) => s,
        Some(_) => return Err(SchemaError::new(join_path(path, "kind"), "kind must be a string")),
    };

    match kind.as_str() {
        "Metric" => Ok(Kind::Metric),
        "Dimension" | "IdValueDimension" => Ok(Kind::Dimension),
        "Filter" => Ok(Kind::Filter),
        "Having" => Ok(Kind::Having),
        "DivideMetric" => {
            let numerator = take_required(map, "numerator_field", path)?;
            let denominator = take_required(map, "denominator_field", path)?;
            map.insert("field".into(), numerator);
            map.insert("divide_by".into(), denominator);
            Ok(Kind::Metric)
        }
        "WtdAvgMetric" => {
            let field = take_required(map, "field", path)?;
            let weight = match take_required(map, "weight", path)? {
                YamlValue::String(w) => w,
                _ => {
                    return Err(SchemaError::new(
                        join_path(path, "weight"),
                        "weight must be a field string",
                    ))
                }
            };
            let weighted = match field {
                YamlValue::String(f) => YamlValue::String(format!("{}*{}", f, weight)),
                YamlValue::Mapping(mut m) => {
                    let mut term = Mapping::new();
                    term.insert("operator".into(), ArithOp::Mul.symbol().into());
                    term.insert("field".into(), weight.clone().into());
                    match m.get_mut("operators") {
                        Some(YamlValue::Sequence(ops)) => ops.push(YamlValue::Mapping(term)),
                        _ => {
                            m.insert("operators".into(), YamlValue::Sequence(vec![YamlValue::Mapping(term)]));
                        }
                    }
                    YamlValue::Mapping(m)
                }
                _ => {
                    return Err(SchemaError::new(
                        join_path(path, "field"),
                        "field must be a string or a mapping",
                    ))
                }
            };
            map.insert("field".into(), weighted);
            map.insert("divide_by".into(), YamlValue::String(weight));
            Ok(Kind::Metric)
        }
        other => Err(SchemaError::new(
            join_path(path, "kind"),
            format!("unknown ingredient kind '{}'", other),
        )),
    }
}

fn take_required(map: &mut Mapping, key: &str, path: &str) -> SchemaResult<YamlValue> {
    map.shift_remove(key)
        .ok_or_else(|| SchemaError::new(path, format!("missing required key '{}'", key)))
}

// =============================================================================
// Per-kind validation
// =============================================================================

fn metric(mut map: Mapping, path: &str, v: &SchemaValidator) -> SchemaResult<MetricSpec> {
    if map.contains_key("extra_fields") {
        return Err(SchemaError::new(
            join_path(path, "extra_fields"),
            "extra_fields are only allowed on dimensions",
        ));
    }
    let raw = take_required(&mut map, "field", path)?;
    let field = v.field_at(&raw, FieldContext::Aggregated, &join_path(path, "field"))?;
    let divide_by = match map.shift_remove("divide_by") {
        None | Some(YamlValue::Null) => None,
        Some(raw) => Some(v.field_at(&raw, FieldContext::Aggregated, &join_path(path, "divide_by"))?),
    };
    let ifzero = match map.shift_remove("ifzero") {
        None => None,
        Some(YamlValue::String(s)) if s == "epsilon" => None,
        Some(raw) => Some(Value::from_yaml(&raw).ok_or_else(|| {
            SchemaError::new(join_path(path, "ifzero"), "ifzero must be a scalar")
        })?),
    };
    let common = common(map, path, v)?;
    Ok(MetricSpec {
        field,
        divide_by,
        ifzero,
        common,
    })
}

fn dimension(mut map: Mapping, path: &str, v: &SchemaValidator) -> SchemaResult<DimensionSpec> {
    let raw = take_required(&mut map, "field", path)?;
    let field = v.field_at(&raw, FieldContext::NonAggregated, &join_path(path, "field"))?;

    let mut extra_fields = Vec::new();
    if let Some(raw) = map.shift_remove("extra_fields") {
        let list_path = join_path(path, "extra_fields");
        let items = raw
            .as_sequence()
            .ok_or_else(|| SchemaError::new(&list_path, "extra_fields must be a list"))?;
        for (i, item) in items.iter().enumerate() {
            let item_path = join_path(&list_path, &format!("[{}]", i));
            let name = item
                .get("name")
                .and_then(YamlValue::as_str)
                .ok_or_else(|| SchemaError::new(&item_path, "missing required key 'name'"))?;
            let raw_field = item
                .get("field")
                .ok_or_else(|| SchemaError::new(&item_path, "missing required key 'field'"))?;
            let field = v.field_at(raw_field, FieldContext::NonAggregated, &join_path(&item_path, "field"))?;
            let role = name.strip_suffix("_expression").unwrap_or(name).to_string();
            extra_fields.push(ExtraField { role, field });
        }
    }

    // `<role>_field` keys become `<role>_expression` extra fields.
    let relocated: Vec<String> = map
        .keys()
        .filter_map(YamlValue::as_str)
        .filter(|k| k.ends_with("_field"))
        .map(str::to_string)
        .collect();
    for key in relocated {
        if let Some(raw) = map.shift_remove(key.as_str()) {
            let role = key.trim_end_matches("_field").to_string();
            let field = v.field_at(&raw, FieldContext::NonAggregated, &join_path(path, &key))?;
            extra_fields.push(ExtraField { role, field });
        }
    }

    let lookup = map.shift_remove("lookup");
    let lookup_default = match map.shift_remove("lookup_default") {
        None => None,
        Some(raw) => Some(Value::from_yaml(&raw).ok_or_else(|| {
            SchemaError::new(join_path(path, "lookup_default"), "lookup_default must be a scalar")
        })?),
    };
    let common = common(map, path, v)?;
    Ok(DimensionSpec {
        field,
        extra_fields,
        lookup,
        lookup_default,
        common,
    })
}

fn condition_spec(
    mut map: Mapping,
    path: &str,
    v: &SchemaValidator,
    ctx: FieldContext,
) -> SchemaResult<ConditionSpec> {
    if map.contains_key("extra_fields") {
        return Err(SchemaError::new(
            join_path(path, "extra_fields"),
            "extra_fields are only allowed on dimensions",
        ));
    }
    let cond_path = join_path(path, "condition");
    let raw = take_required(&mut map, "condition", path)?;
    let condition = v
        .condition_at(&raw, ctx, &cond_path)?
        .ok_or_else(|| SchemaError::new(cond_path, "condition must not be empty"))?;
    let common = common(map, path, v)?;
    Ok(ConditionSpec { condition, common })
}

fn common(mut map: Mapping, path: &str, v: &SchemaValidator) -> SchemaResult<CommonSpec> {
    let format = match map.shift_remove("format") {
        None | Some(YamlValue::Null) => None,
        Some(YamlValue::String(s)) => Some(v.resolve_format(&s)),
        Some(_) => return Err(SchemaError::new(join_path(path, "format"), "format must be a string")),
    };

    let mut quickfilters = Vec::new();
    if let Some(raw) = map.shift_remove("quickfilters") {
        let list_path = join_path(path, "quickfilters");
        let items = raw
            .as_sequence()
            .ok_or_else(|| SchemaError::new(&list_path, "quickfilters must be a list"))?;
        for (i, item) in items.iter().enumerate() {
            let item_path = join_path(&list_path, &format!("[{}]", i));
            let name = item
                .get("name")
                .and_then(YamlValue::as_str)
                .ok_or_else(|| SchemaError::new(&item_path, "missing required key 'name'"))?;
            let cond_path = join_path(&item_path, "condition");
            let raw_cond = item.get("condition").cloned().unwrap_or(YamlValue::Null);
            let condition = v
                .condition_at(&raw_cond, FieldContext::NonAggregated, &cond_path)?
                .ok_or_else(|| SchemaError::new(cond_path, "condition must not be empty"))?;
            quickfilters.push(QuickfilterSpec {
                name: name.to_string(),
                condition,
            });
        }
    }

    let meta = map
        .into_iter()
        .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v)))
        .collect();

    Ok(CommonSpec {
        format,
        quickfilters,
        meta,
    })
}
