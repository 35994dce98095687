use recipe::error::{BadIngredient, BadRecipe};
use recipe::ingredient::{DivideByZero, ExpressionBuilder, Family, Formatter, Ingredient, IngredientKind};
use recipe::row::Row;
use recipe::schema::{IngredientSpec, SchemaValidator};
use recipe::selectable::Selectable;
use recipe::sql::{col, lit_int, sum, Dialect, ExprExt, Query, TableRef};
use recipe::value::Value;
use serde_yaml::Value as YamlValue;
use sqlparser::dialect::{DuckDbDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

fn assert_parses(sql: &str) {
    Parser::parse_sql(&DuckDbDialect {}, sql).unwrap_or_else(|e| panic!("{}\n{}", e, sql));
    Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap_or_else(|e| panic!("{}\n{}", e, sql));
}

fn build(name: &str, src: &str) -> Ingredient {
    let raw: YamlValue = serde_yaml::from_str(src).unwrap();
    let spec = IngredientSpec::from_yaml(name, &raw, &SchemaValidator::default()).unwrap();
    let selectable = Selectable::new("census");
    ExpressionBuilder::new(&selectable).ingredient(name, &spec).unwrap()
}

// =============================================================================
// build_filter
// =============================================================================

#[test]
fn test_build_filter_infers_operator() {
    let state = Ingredient::dimension(col("state")).with_id("state");

    let eq = state.build_filter(Value::from("Vermont"), None).unwrap();
    assert_eq!(eq.id, "state__eq__Vermont");
    assert_eq!(eq.filters[0].to_sql(Dialect::DuckDb), r#""state" = 'Vermont'"#);

    let within = state
        .build_filter(vec![Value::from("Vermont"), Value::from("Maine")], None)
        .unwrap();
    assert_eq!(within.id, "state__in__Vermont,Maine");
    assert_eq!(
        within.filters[0].to_sql(Dialect::DuckDb),
        r#""state" IN ('Vermont', 'Maine')"#
    );
}

#[test]
fn test_build_filter_value_stays_quoted() {
    let state = Ingredient::dimension(col("state")).with_id("state");
    let filter = state.build_filter(Value::from(r"\' OR 1=1 -- "), None).unwrap();

    assert_eq!(
        filter.filters[0].to_sql(Dialect::MySql),
        r"`state` = '\\'' OR 1=1 -- '"
    );
    assert_eq!(
        filter.filters[0].to_sql(Dialect::Postgres),
        r#""state" = '\'' OR 1=1 -- '"#
    );
}

#[test]
fn test_build_filter_explicit_operators() {
    let age = Ingredient::dimension(col("age")).with_id("age");

    let gt = age.build_filter(Value::Int(2), Some("gt")).unwrap();
    assert_eq!(gt.filters[0].to_sql(Dialect::DuckDb), r#""age" > 2"#);

    let notin = age.build_filter(vec![Value::Int(1)], Some("notin")).unwrap();
    assert_eq!(notin.filters[0].to_sql(Dialect::DuckDb), r#""age" NOT IN (1)"#);

    let err = age.build_filter(vec![Value::Int(1)], Some("lt")).unwrap_err();
    assert_eq!(
        err,
        BadRecipe::InvalidFilterOperator {
            operator: "lt".to_string(),
            shape: "list"
        }
    );

    let err = age
        .build_filter(vec![Value::Int(1), Value::Int(2), Value::Int(3)], Some("between"))
        .unwrap_err();
    assert_eq!(err, BadRecipe::BetweenArity(3));
}

#[test]
fn test_build_filter_null() {
    let state = Ingredient::dimension(col("state")).with_id("state");
    let f = state.build_filter(Value::Null, None).unwrap();
    assert_eq!(f.filters[0].to_sql(Dialect::DuckDb), r#""state" IS NULL"#);
    let f = state.build_filter(Value::Null, Some("ne")).unwrap();
    assert_eq!(f.filters[0].to_sql(Dialect::DuckDb), r#""state" IS NOT NULL"#);
}

// =============================================================================
// Kinds
// =============================================================================

#[test]
fn test_conditional_metrics() {
    let cond = col("sex").eq(recipe::sql::lit_str("F"));
    let sum_if = Ingredient::sum_if_metric(cond.clone(), col("pop2000"));
    assert_eq!(
        sum_if.columns[0].to_sql(Dialect::DuckDb),
        r#"SUM(CASE WHEN "sex" = 'F' THEN "pop2000" END)"#
    );

    let count_if = Ingredient::count_if_metric(cond, col("state"), true);
    assert_eq!(
        count_if.columns[0].to_sql(Dialect::DuckDb),
        r#"COUNT(DISTINCT CASE WHEN "sex" = 'F' THEN "state" END)"#
    );
    assert_eq!(count_if.family(), Family::Metric);
}

#[test]
fn test_fallback_division() {
    let m = Ingredient::divide_metric(
        sum(col("pop")),
        sum(col("area")),
        DivideByZero::Fallback(Value::Int(0)),
    );
    let sql = m.columns[0].to_sql(Dialect::DuckDb);
    assert!(sql.starts_with("CASE WHEN CAST(SUM(\"area\") AS DOUBLE PRECISION) = 0.0 THEN 0 ELSE"), "{}", sql);
    assert_parses(&format!("SELECT {} FROM census", sql));
}

#[test]
fn test_lookup_dimension() {
    let lookup: YamlValue = serde_yaml::from_str("{VT: Vermont, ME: Maine}").unwrap();
    let d = Ingredient::lookup_dimension("state", col("state"), &lookup, None).unwrap();
    assert_eq!(d.id, "state");
    assert!(matches!(d.kind, IngredientKind::LookupDimension { .. }));
    assert_eq!(d.format_value(Value::from("VT")).unwrap(), Value::from("Vermont"));
    assert_eq!(d.format_value(Value::from("NH")).unwrap(), Value::from("Not found"));

    let not_a_mapping: YamlValue = serde_yaml::from_str("[VT]").unwrap();
    let err = Ingredient::lookup_dimension("state", col("state"), &not_a_mapping, None).unwrap_err();
    assert_eq!(err, BadIngredient::LookupNotMapping("state".to_string()));
    assert_eq!(err.to_string(), "lookup for 'state' must be a mapping");
}

#[test]
fn test_formatted_extras() {
    let d = Ingredient::dimension(col("state"))
        .with_id("state")
        .with_formatter(Formatter::custom("upper", |v| {
            Ok(Value::from(v.as_str().unwrap_or_default().to_uppercase()))
        }));
    let row = Row::from_pairs([("state_raw", Value::from("vt"))]);
    let extras: Vec<(String, Value)> = d
        .cauldron_extras()
        .into_iter()
        .map(|(name, producer)| (name, producer(&row).unwrap()))
        .collect();
    assert_eq!(
        extras,
        vec![
            ("state".to_string(), Value::from("VT")),
            ("state_id".to_string(), Value::from("vt")),
        ]
    );
}

#[test]
fn test_anonymizer_runs_last_when_flagged() {
    let mut d = Ingredient::dimension(col("name"))
        .with_id("name")
        .with_formatter(Formatter::custom("trim", |v| {
            Ok(Value::from(v.as_str().unwrap_or_default().trim()))
        }))
        .with_anonymizer(Formatter::custom("mask", |v| {
            Ok(Value::from("*".repeat(v.as_str().unwrap_or_default().len())))
        }));
    assert_eq!(d.format_value(Value::from(" Ann ")).unwrap(), Value::from("Ann"));
    d.anonymize = true;
    assert_eq!(d.format_value(Value::from(" Ann ")).unwrap(), Value::from("***"));
}

// =============================================================================
// Built from definitions
// =============================================================================

#[test]
fn test_built_metric_query_parses() {
    let m = build(
        "pct",
        "{kind: DivideMetric, numerator_field: 'sum(pop2000)', denominator_field: 'sum(pop2008)', format: percent1}",
    );
    assert!(matches!(m.kind, IngredientKind::DivideMetric { .. }));
    assert_eq!(m.meta.get("format").and_then(YamlValue::as_str), Some(".1%"));

    let query = Query::new()
        .select(m.query_columns().unwrap())
        .from(TableRef::new("census"));
    assert_parses(&query.to_sql(Dialect::DuckDb));
    assert_parses(&query.to_sql(Dialect::Postgres));
}

#[test]
fn test_built_dimension_with_id() {
    let d = build("state", "{kind: Dimension, field: state, id_field: state_code}");
    let labels: Vec<String> = d
        .query_columns()
        .unwrap()
        .iter()
        .map(|c| c.to_sql(Dialect::DuckDb))
        .collect();
    assert_eq!(
        labels,
        vec![r#""state_code" AS "state_id""#, r#""state" AS "state""#]
    );
    assert_eq!(d.describe(), r#"(Dimension)state "state_code" "state""#);
}

#[test]
fn test_built_quickfilters() {
    let m = build(
        "pop",
        "{field: pop2000, quickfilters: [{name: vt, condition: {field: state, eq: VT}}]}",
    );
    assert_eq!(m.quickfilters.len(), 1);
    assert_eq!(m.quickfilters[0].name, "vt");
    assert_eq!(
        m.quickfilters[0].condition.to_sql(Dialect::DuckDb),
        r#""state" = 'VT'"#
    );
}

#[test]
fn test_literal_operand() {
    let m = Ingredient::metric(sum(col("pop")).mul(lit_int(2))).with_id("double");
    assert_eq!(m.describe(), r#"(Metric)double SUM("pop") * 2"#);
}
