//! Field-string mini-grammar.
//!
//! ```text
//! field    := [aggr] "(" chain ")" | chain
//! chain    := token { op token }
//! op       := "+" | "-" | "*" | "/"
//! ```
//!
//! `sum(a+b-c)` parses to value `a`, aggregation `sum` and the operator chain
//! `[+b, -c]`. Aggregation wrappers nest exactly one level.

use std::sync::LazyLock;

use regex::Regex;

use super::error::{SchemaError, SchemaResult};
use super::field::{Aggregation, ArithOp, FieldDescriptor, OperatorTerm};

static WRAPPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w*)\((.*)\)$").unwrap());
static TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+\-*/])(\d+(?:\.\d+)?(?:[eE][+\-]?\d+)?\b|[\w.]+)").unwrap()
});

/// Parse a field string, using `default` when no aggregation wrapper is
/// present (or the wrapper has no keyword, as in `(a+b)`).
pub fn parse_field(text: &str, default: Aggregation) -> SchemaResult<FieldDescriptor> {
    parse_field_at(text, default, "")
}

pub(crate) fn parse_field_at(
    text: &str,
    default: Aggregation,
    path: &str,
) -> SchemaResult<FieldDescriptor> {
    let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return Err(SchemaError::new(path, "field must not be empty"));
    }

    if let Some(caps) = WRAPPER.captures(&stripped) {
        let keyword = &caps[1];
        let aggregation = if keyword.is_empty() {
            default
        } else {
            Aggregation::from_keyword(keyword).ok_or_else(|| {
                SchemaError::new(path, format!("unknown aggregation '{}'", keyword))
            })?
        };
        let inner = &caps[2];
        if inner.is_empty() {
            return Err(SchemaError::new(path, "field must not be empty"));
        }
        let (value, operators) = split_operators(inner, path)?;
        let mut field = FieldDescriptor::new(value, aggregation);
        field.operators = operators;
        return Ok(field);
    }

    let (value, operators) = split_operators(&stripped, path)?;
    let mut field = FieldDescriptor::new(value, default);
    field.is_literal = operators.is_empty() && is_number(&field.value);
    field.operators = operators;
    Ok(field)
}

/// Split `a+b-c` into `a` and the chain `[+b, -c]`. Operator fields are bare
/// references and are not scanned for further operators. Every character
/// after the leading value must belong to an `<op><token>` term.
fn split_operators(text: &str, path: &str) -> SchemaResult<(String, Vec<OperatorTerm>)> {
    if is_number(text) {
        return Ok((text.to_string(), Vec::new()));
    }
    let split_at = text
        .char_indices()
        .skip(1)
        .find(|&(i, c)| ArithOp::from_char(c).is_some() && !is_exponent_sign(text, i))
        .map(|(i, _)| i);

    let Some(pos) = split_at else {
        return Ok((text.to_string(), Vec::new()));
    };

    let rest = &text[pos..];
    let leftover = |from: usize, to: usize| {
        SchemaError::new(
            path,
            format!("unexpected '{}' in field '{}'", &rest[from..to], text),
        )
    };
    let mut covered = 0;
    let mut operators = Vec::new();
    for caps in TERM.captures_iter(rest) {
        let (Some(term), Some(op), Some(name)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if term.start() != covered {
            return Err(leftover(covered, term.start()));
        }
        covered = term.end();
        let operator = op
            .as_str()
            .chars()
            .next()
            .and_then(ArithOp::from_char)
            .ok_or_else(|| leftover(op.start(), op.end()))?;
        let mut field = FieldDescriptor::new(name.as_str(), Aggregation::None);
        field.is_literal = is_number(name.as_str());
        operators.push(OperatorTerm { operator, field });
    }
    if covered != rest.len() {
        return Err(leftover(covered, rest.len()));
    }

    Ok((text[..pos].to_string(), operators))
}

/// `+`/`-` at `i` is the exponent sign of a leading number such as `2.5e-3`.
fn is_exponent_sign(text: &str, i: usize) -> bool {
    matches!(&text[i..i + 1], "+" | "-")
        && text[..i].ends_with(['e', 'E'])
        && is_number(&text[..i - 1])
}

/// Finite numeric literal; `inf` and `nan` spellings are column names.
pub(crate) fn is_number(s: &str) -> bool {
    s.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false)
}
