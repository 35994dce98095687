//! Expression building: descriptors and specs into SQL expressions and
//! ingredients.
//!
//! A field is built in a fixed order: column, operator chain, condition
//! wrap, aggregation, cast, then coalesce with the default.

use tracing::trace;

use super::{predicate, DivideByZero, Formatter, Ingredient, IngredientKind, LookupTable};
use crate::error::{BadIngredient, RecipeResult};
use crate::schema::parser::is_number;
use crate::schema::{
    Aggregation, ArithOp, Combinator, Condition, FieldDescriptor, IngredientSpec,
};
use crate::selectable::Selectable;
use crate::sql::{
    avg, case_when, coalesce, count, count_distinct, func, lit_str, max, min, sum,
    BinaryOperator, Expr, ExprExt,
};
use crate::value::Value;

/// Builds expressions against one [`Selectable`].
#[derive(Debug, Clone)]
pub struct ExpressionBuilder<'a> {
    selectable: &'a Selectable,
    epsilon: f64,
}

impl<'a> ExpressionBuilder<'a> {
    pub fn new(selectable: &'a Selectable) -> Self {
        Self {
            selectable,
            epsilon: super::DEFAULT_EPSILON,
        }
    }

    /// Epsilon for divide metrics that do not set `ifzero`.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn field(&self, field: &FieldDescriptor) -> Result<Expr, BadIngredient> {
        let mut expr = self.base(field)?;

        for term in &field.operators {
            let right = self.base(&term.field)?;
            let op = match term.operator {
                ArithOp::Add => BinaryOperator::Plus,
                ArithOp::Sub => BinaryOperator::Minus,
                ArithOp::Mul => BinaryOperator::Mul,
                ArithOp::Div => BinaryOperator::Div,
            };
            // Left-associative: `a+b*c` is `(a+b)*c`.
            let left = match (&expr, op) {
                (
                    Expr::BinaryOp {
                        op: BinaryOperator::Plus | BinaryOperator::Minus,
                        ..
                    },
                    BinaryOperator::Mul | BinaryOperator::Div,
                ) => expr.paren(),
                _ => expr,
            };
            expr = left.binary(op, right);
        }

        if let Some(condition) = &field.condition {
            expr = case_when(self.condition(condition)?, expr, None);
        }

        expr = aggregate(field.aggregation, expr);

        if let Some(data_type) = &field.cast_as {
            expr = expr.cast(data_type.clone());
        }
        if let Some(default) = &field.default {
            expr = coalesce(vec![expr, default.to_expr()]);
        }
        Ok(expr)
    }

    /// The column or literal a field starts from.
    fn base(&self, field: &FieldDescriptor) -> Result<Expr, BadIngredient> {
        // A number can never be a column in an arithmetic chain.
        if field.is_literal || (!field.operators.is_empty() && is_number(&field.value)) {
            return literal(&field.value);
        }
        self.selectable.column(&field.value)
    }

    pub fn condition(&self, condition: &Condition) -> Result<Expr, BadIngredient> {
        match condition {
            Condition::Leaf { field, op, operand } => {
                let left = self.field(field)?;
                predicate(left, *op, operand.clone()).map_err(|e| BadIngredient::Invalid {
                    id: field.value.clone(),
                    reason: e.to_string(),
                })
            }
            Condition::Composite {
                combinator,
                children,
            } => {
                let op = match combinator {
                    Combinator::And => BinaryOperator::And,
                    Combinator::Or => BinaryOperator::Or,
                };
                let mut built = children.iter().map(|child| -> Result<Expr, BadIngredient> {
                    let expr = self.condition(child)?;
                    Ok(match child {
                        Condition::Composite { children, .. } if children.len() > 1 => expr.paren(),
                        _ => expr,
                    })
                });
                let first = built.next().ok_or_else(|| BadIngredient::Invalid {
                    id: combinator.key().to_string(),
                    reason: "empty condition list".to_string(),
                })??;
                built.try_fold(first, |acc, next| -> Result<Expr, BadIngredient> {
                    Ok(acc.binary(op, next?))
                })
            }
        }
    }

    /// Build the ingredient `id` from a validated spec.
    pub fn ingredient(&self, id: &str, spec: &IngredientSpec) -> RecipeResult<Ingredient> {
        trace!(id, kind = spec.kind_name(), "building ingredient");
        let mut ingredient = match spec {
            IngredientSpec::Metric(m) => {
                let expr = self.field(&m.field)?;
                match &m.divide_by {
                    Some(divide_by) => {
                        let policy = match &m.ifzero {
                            Some(fallback) => DivideByZero::Fallback(fallback.clone()),
                            None => DivideByZero::Epsilon(self.epsilon),
                        };
                        Ingredient::divide_metric(expr, self.field(divide_by)?, policy)
                    }
                    None => Ingredient::metric(expr),
                }
            }
            IngredientSpec::Dimension(d) => {
                let value = self.field(&d.field)?;
                let roles = d
                    .extra_fields
                    .iter()
                    .map(|extra| Ok((extra.role.clone(), self.field(&extra.field)?)))
                    .collect::<Result<Vec<_>, BadIngredient>>()?;
                let mut dimension = Ingredient::dimension_with_roles(value, roles);
                if let Some(lookup) = &d.lookup {
                    let table = LookupTable::from_yaml(id, lookup, d.lookup_default.clone())?;
                    dimension.formatters.insert(0, Formatter::Lookup(table.clone()));
                    dimension.kind = IngredientKind::LookupDimension { lookup: table };
                }
                dimension
            }
            IngredientSpec::Filter(c) => Ingredient::filter(self.condition(&c.condition)?),
            IngredientSpec::Having(c) => Ingredient::having(self.condition(&c.condition)?),
        };

        let common = spec.common();
        for quickfilter in &common.quickfilters {
            ingredient = ingredient.with_quickfilter(&quickfilter.name, self.condition(&quickfilter.condition)?);
        }
        ingredient.meta = common.meta.clone();
        if let Some(format) = &common.format {
            ingredient.meta.insert("format".to_string(), format.as_str().into());
        }
        Ok(ingredient.with_id(id))
    }
}

fn literal(text: &str) -> Result<Expr, BadIngredient> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i).to_expr());
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| Value::Float(f).to_expr())
        .ok_or_else(|| BadIngredient::Invalid {
            id: text.to_string(),
            reason: "literal is not a number".to_string(),
        })
}

/// Wrap `expr` in its aggregation function.
pub fn aggregate(aggregation: Aggregation, expr: Expr) -> Expr {
    let date_trunc = |unit: &str, expr: Expr| func("DATE_TRUNC", vec![lit_str(unit), expr]);
    match aggregation {
        Aggregation::Sum => sum(expr),
        Aggregation::Min => min(expr),
        Aggregation::Max => max(expr),
        Aggregation::Avg => avg(expr),
        Aggregation::Count => count(expr),
        Aggregation::CountDistinct => count_distinct(expr),
        Aggregation::Month => date_trunc("month", expr),
        Aggregation::Week => date_trunc("week", expr),
        Aggregation::Year => date_trunc("year", expr),
        Aggregation::Quarter => date_trunc("quarter", expr),
        Aggregation::Age => func("DATE_PART", vec![lit_str("year"), func("AGE", vec![expr])]),
        Aggregation::None => expr,
    }
}
