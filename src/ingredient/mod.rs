//! Ingredients: named units that contribute columns, group-bys, filters
//! and havings to a query.
//!
//! One [`Ingredient`] record carries every variant; the [`IngredientKind`]
//! tag holds the variant-specific payload (lookup table, divide-by-zero
//! policy, distinct toggle).

pub mod build;
pub mod format;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_yaml::Value as YamlValue;
use uuid::Uuid;

use crate::error::{BadIngredient, BadRecipe};
use crate::row::Row;
use crate::schema::{ComparisonOp, Operand};
use crate::sql::{
    case_when, coalesce, count, count_distinct, sum, DataType, Dialect, Expr, ExprExt,
    OrderByExpr, SelectExpr, SortDir,
};
use crate::value::Value;

pub use build::ExpressionBuilder;
pub use format::{FormatError, Formatter, LookupTable, DEFAULT_LOOKUP_MISS};

/// Epsilon added to denominators by default.
pub const DEFAULT_EPSILON: f64 = 1e-9;

// =============================================================================
// Kinds
// =============================================================================

/// The four roles an ingredient can play in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Family {
    Dimension,
    Metric,
    Filter,
    Having,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Dimension => "Dimension",
            Family::Metric => "Metric",
            Family::Filter => "Filter",
            Family::Having => "Having",
        };
        f.write_str(name)
    }
}

/// Zero-denominator handling for [`IngredientKind::DivideMetric`].
#[derive(Debug, Clone, PartialEq)]
pub enum DivideByZero {
    /// `num / (COALESCE(den, 0.0) + epsilon)`; never fails.
    Epsilon(f64),
    /// `fallback` when the denominator is exactly zero.
    Fallback(Value),
}

impl Default for DivideByZero {
    fn default() -> Self {
        DivideByZero::Epsilon(DEFAULT_EPSILON)
    }
}

impl DivideByZero {
    /// The division expression; both sides are cast to floating point.
    pub fn to_expr(&self, numerator: Expr, denominator: Expr) -> Expr {
        let num = numerator.cast(DataType::Float64);
        let den = denominator.cast(DataType::Float64);
        match self {
            DivideByZero::Epsilon(epsilon) => num.div(
                coalesce(vec![den, Expr::from(0.0)])
                    .add(Expr::from(*epsilon))
                    .paren(),
            ),
            DivideByZero::Fallback(fallback) => case_when(
                den.clone().eq(Expr::from(0.0)),
                fallback.to_expr(),
                Some(num.div(den)),
            ),
        }
    }

    /// Scalar semantics of [`to_expr`](Self::to_expr); a `None` denominator
    /// is SQL NULL.
    pub fn evaluate(&self, numerator: f64, denominator: Option<f64>) -> Value {
        match (self, denominator) {
            (DivideByZero::Epsilon(epsilon), d) => {
                Value::Float(numerator / (d.unwrap_or(0.0) + epsilon))
            }
            (DivideByZero::Fallback(fallback), Some(d)) if d == 0.0 => fallback.clone(),
            (DivideByZero::Fallback(_), Some(d)) => Value::Float(numerator / d),
            (DivideByZero::Fallback(_), None) => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngredientKind {
    Dimension,
    LookupDimension { lookup: LookupTable },
    Metric,
    DivideMetric { policy: DivideByZero },
    SumIfMetric,
    CountIfMetric { distinct: bool },
    Filter,
    Having,
}

impl IngredientKind {
    pub fn family(&self) -> Family {
        match self {
            IngredientKind::Dimension | IngredientKind::LookupDimension { .. } => Family::Dimension,
            IngredientKind::Metric
            | IngredientKind::DivideMetric { .. }
            | IngredientKind::SumIfMetric
            | IngredientKind::CountIfMetric { .. } => Family::Metric,
            IngredientKind::Filter => Family::Filter,
            IngredientKind::Having => Family::Having,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IngredientKind::Dimension => "Dimension",
            IngredientKind::LookupDimension { .. } => "LookupDimension",
            IngredientKind::Metric => "Metric",
            IngredientKind::DivideMetric { .. } => "DivideMetric",
            IngredientKind::SumIfMetric => "SumIfMetric",
            IngredientKind::CountIfMetric { .. } => "CountIfMetric",
            IngredientKind::Filter => "Filter",
            IngredientKind::Having => "Having",
        }
    }
}

/// A named predicate offered alongside an ingredient.
#[derive(Debug, Clone, PartialEq)]
pub struct Quickfilter {
    pub name: String,
    pub condition: Expr,
}

/// Computes one enchanted field from a row.
pub type Producer<'a> = Box<dyn Fn(&Row) -> Result<Value, FormatError> + 'a>;

// =============================================================================
// Ingredient
// =============================================================================

#[derive(Debug, Clone)]
pub struct Ingredient {
    pub id: String,
    pub kind: IngredientKind,
    pub columns: Vec<Expr>,
    pub filters: Vec<Expr>,
    pub havings: Vec<Expr>,
    pub group_by: Vec<Expr>,
    /// Applied left to right to the raw value.
    pub formatters: Vec<Formatter>,
    pub column_suffixes: Option<Vec<String>>,
    pub ordering: SortDir,
    pub anonymize: bool,
    /// Appended to the formatter chain while `anonymize` is set.
    pub anonymizer: Option<Formatter>,
    pub quickfilters: Vec<Quickfilter>,
    pub meta: BTreeMap<String, YamlValue>,
}

fn generated_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

impl Ingredient {
    /// An empty ingredient of `kind` with a generated id.
    pub fn new(kind: IngredientKind) -> Self {
        Self {
            id: generated_id(),
            kind,
            columns: Vec::new(),
            filters: Vec::new(),
            havings: Vec::new(),
            group_by: Vec::new(),
            formatters: Vec::new(),
            column_suffixes: None,
            ordering: SortDir::Asc,
            anonymize: false,
            anonymizer: None,
            quickfilters: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Set the columns, checking the suffix contract.
    pub fn with_columns(
        mut self,
        columns: Vec<Expr>,
        suffixes: Option<Vec<String>>,
    ) -> Result<Self, BadIngredient> {
        match &suffixes {
            Some(s) if s.len() != columns.len() => {
                return Err(BadIngredient::SuffixCountMismatch {
                    id: self.id,
                    columns: columns.len(),
                    suffixes: s.len(),
                })
            }
            None if columns.len() > 1 => {
                return Err(BadIngredient::AmbiguousColumns {
                    id: self.id,
                    columns: columns.len(),
                })
            }
            _ => {}
        }
        if self.kind.family() == Family::Dimension {
            self.group_by = columns.clone();
        }
        self.columns = columns;
        self.column_suffixes = suffixes;
        Ok(self)
    }

    // -------------------------------------------------------------------------
    // Constructors
    // -------------------------------------------------------------------------

    pub fn dimension(expr: Expr) -> Self {
        let mut ingredient = Self::new(IngredientKind::Dimension);
        ingredient.group_by = vec![expr.clone()];
        ingredient.columns = vec![expr];
        ingredient
    }

    /// A dimension with auxiliary role columns, labelled `<id>_<role>`.
    /// The `id` role comes first, the value column last.
    pub fn dimension_with_roles(value: Expr, roles: Vec<(String, Expr)>) -> Self {
        if roles.is_empty() {
            return Self::dimension(value);
        }
        let (mut ordered, others): (Vec<_>, Vec<_>) = roles.into_iter().partition(|(r, _)| r == "id");
        ordered.extend(others);
        let mut suffixes: Vec<String> = ordered.iter().map(|(r, _)| format!("_{}", r)).collect();
        let mut columns: Vec<Expr> = ordered.into_iter().map(|(_, e)| e).collect();
        suffixes.push(String::new());
        columns.push(value);

        let mut ingredient = Self::new(IngredientKind::Dimension);
        ingredient.group_by = columns.clone();
        ingredient.columns = columns;
        ingredient.column_suffixes = Some(suffixes);
        ingredient
    }

    /// Two-column dimension: an id column plus a display value.
    pub fn id_value_dimension(id_expr: Expr, value_expr: Expr) -> Self {
        Self::dimension_with_roles(value_expr, vec![("id".to_string(), id_expr)])
    }

    /// A dimension `id` whose raw values are mapped through `lookup`.
    pub fn lookup_dimension(
        id: &str,
        expr: Expr,
        lookup: &YamlValue,
        default: Option<Value>,
    ) -> Result<Self, BadIngredient> {
        let mut ingredient = Self::dimension(expr).with_id(id);
        let table = LookupTable::from_yaml(id, lookup, default)?;
        ingredient.formatters.insert(0, Formatter::Lookup(table.clone()));
        ingredient.kind = IngredientKind::LookupDimension { lookup: table };
        Ok(ingredient)
    }

    pub fn metric(expr: Expr) -> Self {
        let mut ingredient = Self::new(IngredientKind::Metric);
        ingredient.columns = vec![expr];
        ingredient
    }

    pub fn divide_metric(numerator: Expr, denominator: Expr, policy: DivideByZero) -> Self {
        let mut ingredient = Self::new(IngredientKind::DivideMetric {
            policy: policy.clone(),
        });
        ingredient.columns = vec![policy.to_expr(numerator, denominator)];
        ingredient
    }

    /// `SUM(CASE WHEN condition THEN expr END)`
    pub fn sum_if_metric(condition: Expr, expr: Expr) -> Self {
        let mut ingredient = Self::new(IngredientKind::SumIfMetric);
        ingredient.columns = vec![sum(case_when(condition, expr, None))];
        ingredient
    }

    /// `COUNT([DISTINCT] CASE WHEN condition THEN expr END)`
    pub fn count_if_metric(condition: Expr, expr: Expr, distinct: bool) -> Self {
        let inner = case_when(condition, expr, None);
        let mut ingredient = Self::new(IngredientKind::CountIfMetric { distinct });
        ingredient.columns = vec![if distinct {
            count_distinct(inner)
        } else {
            count(inner)
        }];
        ingredient
    }

    pub fn filter(predicate: Expr) -> Self {
        let mut ingredient = Self::new(IngredientKind::Filter);
        ingredient.filters = vec![predicate];
        ingredient
    }

    pub fn having(predicate: Expr) -> Self {
        let mut ingredient = Self::new(IngredientKind::Having);
        ingredient.havings = vec![predicate];
        ingredient
    }

    // -------------------------------------------------------------------------
    // Builders
    // -------------------------------------------------------------------------

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatters.push(formatter);
        self
    }

    pub fn with_anonymizer(mut self, anonymizer: Formatter) -> Self {
        self.anonymizer = Some(anonymizer);
        self
    }

    pub fn with_ordering(mut self, ordering: SortDir) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_quickfilter(mut self, name: &str, condition: Expr) -> Self {
        self.quickfilters.push(Quickfilter {
            name: name.to_string(),
            condition,
        });
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<YamlValue>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    // -------------------------------------------------------------------------
    // Query parts
    // -------------------------------------------------------------------------

    pub fn family(&self) -> Family {
        self.kind.family()
    }

    /// The formatter chain, with the anonymizer last when anonymizing.
    pub fn effective_formatters(&self) -> Vec<&Formatter> {
        let mut chain: Vec<&Formatter> = self.formatters.iter().collect();
        if self.anonymize {
            chain.extend(self.anonymizer.as_ref());
        }
        chain
    }

    pub fn is_formatted(&self) -> bool {
        !self.effective_formatters().is_empty()
    }

    /// Label suffixes, one per column. The bare-id slot moves to `_raw`
    /// when formatters apply so the formatted value can take the id.
    pub fn make_column_suffixes(&self) -> Result<Vec<String>, BadIngredient> {
        let formatted = self.is_formatted();
        let suffixes = match &self.column_suffixes {
            Some(explicit) => {
                if explicit.len() != self.columns.len() {
                    return Err(BadIngredient::SuffixCountMismatch {
                        id: self.id.clone(),
                        columns: self.columns.len(),
                        suffixes: explicit.len(),
                    });
                }
                explicit.clone()
            }
            None => match self.columns.len() {
                0 => Vec::new(),
                1 => vec![String::new()],
                n => {
                    return Err(BadIngredient::AmbiguousColumns {
                        id: self.id.clone(),
                        columns: n,
                    })
                }
            },
        };
        Ok(suffixes
            .into_iter()
            .map(|s| if s.is_empty() && formatted { "_raw".to_string() } else { s })
            .collect())
    }

    /// Labelled select items, `<id><suffix>`.
    pub fn query_columns(&self) -> Result<Vec<SelectExpr>, BadIngredient> {
        let suffixes = self.make_column_suffixes()?;
        Ok(self
            .columns
            .iter()
            .zip(suffixes)
            .map(|(column, suffix)| column.clone().alias(&format!("{}{}", self.id, suffix)))
            .collect())
    }

    /// Dimensions order by their value before their id.
    pub fn order_by_columns(&self) -> Vec<OrderByExpr> {
        let columns: Vec<&Expr> = if self.family() == Family::Dimension {
            self.columns.iter().rev().collect()
        } else {
            self.columns.iter().collect()
        };
        columns
            .into_iter()
            .map(|c| match self.ordering {
                SortDir::Asc => OrderByExpr::asc(c.clone()),
                SortDir::Desc => OrderByExpr::desc(c.clone()),
            })
            .collect()
    }

    /// Label of the column holding this dimension's id.
    fn id_prop(&self) -> String {
        let has_id_role = self
            .column_suffixes
            .as_ref()
            .is_some_and(|s| s.iter().any(|s| s == "_id"));
        if has_id_role {
            format!("{}_id", self.id)
        } else if self.is_formatted() {
            format!("{}_raw", self.id)
        } else {
            self.id.clone()
        }
    }

    pub fn format_value(&self, value: Value) -> Result<Value, FormatError> {
        self.effective_formatters()
            .into_iter()
            .try_fold(value, |v, f| f.apply(&v))
    }

    /// Derived fields added to each result row, in order.
    pub fn cauldron_extras(&self) -> Vec<(String, Producer<'_>)> {
        let mut extras: Vec<(String, Producer<'_>)> = Vec::new();
        if self.is_formatted() {
            let raw = format!("{}_raw", self.id);
            let producer: Producer<'_> =
                Box::new(move |row: &Row| self.format_value(field(row, &raw)?));
            extras.push((self.id.clone(), producer));
        }
        if self.family() == Family::Dimension {
            let prop = self.id_prop();
            let producer: Producer<'_> = Box::new(move |row: &Row| field(row, &prop));
            extras.push((format!("{}_id", self.id), producer));
        }
        extras
    }

    /// Build a filter on this ingredient's first column. Without an explicit
    /// operator, lists filter with `in` and scalars with `eq`.
    pub fn build_filter(
        &self,
        value: impl Into<Operand>,
        operator: Option<&str>,
    ) -> Result<Ingredient, BadRecipe> {
        let value = value.into();
        let column = self
            .columns
            .first()
            .cloned()
            .ok_or_else(|| BadRecipe::NoColumns(self.id.clone()))?;

        let is_list = value.is_list();
        let op = match operator {
            None if is_list => ComparisonOp::In,
            None => ComparisonOp::Equal,
            Some(key) => ComparisonOp::from_key(key)
                .filter(|op| op.is_set_op() == is_list)
                .ok_or_else(|| BadRecipe::InvalidFilterOperator {
                    operator: key.to_string(),
                    shape: if is_list { "list" } else { "scalar" },
                })?,
        };

        let rendered: Vec<String> = match &value {
            Operand::Scalar(v) => vec![v.to_string()],
            Operand::List(vs) => vs.iter().map(Value::to_string).collect(),
        };
        let id = format!("{}__{}__{}", self.id, op.key(), rendered.join(","));
        Ok(Ingredient::filter(predicate(column, op, value)?).with_id(&id))
    }

    /// `(<Kind>)<id> <columns>`
    pub fn describe(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.to_sql(Dialect::default()))
            .collect();
        format!("({}){} {}", self.kind.name(), self.id, columns.join(" "))
    }
}

fn field(row: &Row, name: &str) -> Result<Value, FormatError> {
    row.get(name)
        .cloned()
        .ok_or_else(|| FormatError::MissingField(name.to_string()))
}

/// `left <op> operand`. Comparing to null with `eq`/`ne` tests for
/// (non-)nullness.
pub(crate) fn predicate(left: Expr, op: ComparisonOp, operand: Operand) -> Result<Expr, BadRecipe> {
    let expr = match (op, operand) {
        (ComparisonOp::Equal, Operand::Scalar(Value::Null)) => left.is_null(),
        (ComparisonOp::NotEqual, Operand::Scalar(Value::Null)) => Expr::IsNull {
            expr: Box::new(left),
            negated: true,
        },
        (ComparisonOp::In, operand) => left.in_list(literals(operand)),
        (ComparisonOp::NotIn, operand) => left.not_in_list(literals(operand)),
        (ComparisonOp::Between, operand) => match literals(operand).as_slice() {
            [low, high] => left.between(low.clone(), high.clone()),
            other => return Err(BadRecipe::BetweenArity(other.len())),
        },
        (op, Operand::Scalar(v)) => {
            let right = v.to_expr();
            match op {
                ComparisonOp::GreaterThan => left.gt(right),
                ComparisonOp::GreaterOrEqual => left.gte(right),
                ComparisonOp::LessThan => left.lt(right),
                ComparisonOp::LessOrEqual => left.lte(right),
                ComparisonOp::NotEqual => left.ne(right),
                _ => left.eq(right),
            }
        }
        (op, Operand::List(_)) => {
            return Err(BadRecipe::InvalidFilterOperator {
                operator: op.key().to_string(),
                shape: "list",
            })
        }
    };
    Ok(expr)
}

fn literals(operand: Operand) -> Vec<Expr> {
    operand.into_list().iter().map(Value::to_expr).collect()
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
