use recipe::config::Settings;
use recipe::error::{BadRecipe, RecipeError};
use recipe::ingredient::{Formatter, Ingredient};
use recipe::recipe::{Recipe, Session, SessionError};
use recipe::row::Row;
use recipe::selectable::Selectable;
use recipe::shelf::{IngredientRef, Shelf};
use recipe::sql::{col, lit_int, sum, table_col, DataType, Dialect, ExprExt, Query};
use recipe::value::Value;
use serde_yaml::Value as YamlValue;
use sqlparser::dialect::{DuckDbDialect, GenericDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

/// Returns canned rows and remembers what it was asked.
#[derive(Default)]
struct CannedSession {
    rows: Vec<Row>,
    calls: usize,
    last_sql: Option<String>,
}

impl CannedSession {
    fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

impl Session for CannedSession {
    fn fetch(&mut self, query: &Query, dialect: Dialect) -> Result<Vec<Row>, SessionError> {
        self.calls += 1;
        self.last_sql = Some(query.to_sql(dialect));
        Ok(self.rows.clone())
    }
}

struct BrokenSession;

impl Session for BrokenSession {
    fn fetch(&mut self, _: &Query, _: Dialect) -> Result<Vec<Row>, SessionError> {
        Err(SessionError::new("connection refused"))
    }
}

fn census() -> Shelf {
    Shelf::new(
        Selectable::new("census")
            .with_column("state", DataType::String)
            .with_column("sex", DataType::String)
            .with_column("age", DataType::Int32)
            .with_column("pop2000", DataType::Int64),
    )
    .with("state", Ingredient::dimension(col("state")))
    .with("sex", Ingredient::dimension(col("sex")))
    .with("pop", Ingredient::metric(sum(col("pop2000"))))
    .with("adults", Ingredient::filter(col("age").gte(lit_int(18))))
}

fn assert_parses(sql: &str, dialect: &dyn sqlparser::dialect::Dialect) {
    Parser::parse_sql(dialect, sql).unwrap_or_else(|e| panic!("{}\n{}", e, sql));
}

// =============================================================================
// Compilation
// =============================================================================

#[test]
fn test_compiled_sql() {
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .dimensions(["state"])
        .unwrap()
        .filters([col("age").gt(lit_int(2))])
        .unwrap()
        .order_by(["state"])
        .unwrap();
    let sql = recipe.to_sql().unwrap();
    insta::assert_snapshot!(sql, @r#"
SELECT
  SUM("pop2000") AS "pop",
  "state" AS "state"
FROM "census"
WHERE "age" > 2
GROUP BY "state"
ORDER BY "state"
"#);
    assert_parses(&sql, &DuckDbDialect {});
}

#[test]
fn test_shelf_filters_and_havings() {
    let shelf = census().with("big", Ingredient::having(sum(col("pop2000")).gt(lit_int(1000))));
    let mut recipe = Recipe::new(shelf)
        .dimensions(["sex"])
        .unwrap()
        .metrics(["pop"])
        .unwrap()
        .filters(["adults", "big"])
        .unwrap()
        .dialect(Dialect::Postgres);
    let sql = recipe.to_sql().unwrap();
    assert!(sql.contains("WHERE \"age\" >= 18"), "{}", sql);
    assert!(sql.contains("HAVING SUM(\"pop2000\") > 1000"), "{}", sql);
    assert_parses(&sql, &PostgreSqlDialect {});
}

#[test]
fn test_filter_condition_spec() {
    let spec: YamlValue = serde_yaml::from_str("{or: [{field: state, eq: Vermont}, {field: age, lt: 5}]}").unwrap();
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .filters([IngredientRef::from(spec), IngredientRef::from("adults")])
        .unwrap();
    let sql = recipe.to_sql().unwrap();
    assert!(
        sql.contains(r#"WHERE ("state" = 'Vermont' OR "age" < 5) AND "age" >= 18"#),
        "{}",
        sql
    );
}

#[test]
fn test_bad_filter_spec() {
    let spec: YamlValue = serde_yaml::from_str("{field: 'sum(age)', gt: 5}").unwrap();
    let err = Recipe::new(census()).filters([spec]).unwrap_err();
    match err {
        RecipeError::Schema(e) => assert!(e.path.starts_with("condition.field"), "{}", e),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_wrong_kind() {
    let err = Recipe::new(census()).metrics(["state"]).unwrap_err();
    assert_eq!(err.to_string(), "'state' is a Dimension, expected Metric");

    let err = Recipe::new(census()).filters(["pop"]).unwrap_err();
    assert_eq!(err.to_string(), "'pop' is a Metric, expected Filter or Having");
}

#[test]
fn test_unknown_column_table() {
    let shelf = census().with("area", Ingredient::metric(sum(table_col("states", "area"))));
    let err = Recipe::new(shelf)
        .metrics(["pop", "area"])
        .unwrap()
        .to_sql()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Recipes must use ingredients that all come from the same table, found: census, states"
    );
}

#[test]
fn test_limit_offset() {
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .limit(10)
        .offset(20);
    assert!(recipe.to_sql().unwrap().ends_with("LIMIT 10 OFFSET 20"));

    let mut recipe = recipe.limit(0).offset(0);
    assert!(!recipe.to_sql().unwrap().contains("LIMIT"));
}

#[test]
fn test_order_by_descending_dimension_uses_value_first() {
    let shelf = census().with(
        "region",
        Ingredient::id_value_dimension(col("region_id"), col("region_name")),
    );
    let mut recipe = Recipe::new(shelf)
        .dimensions(["region"])
        .unwrap()
        .order_by(["-region"])
        .unwrap();
    let sql = recipe.to_sql().unwrap();
    assert!(
        sql.ends_with(r#"ORDER BY "region_name" DESC, "region_id" DESC"#),
        "{}",
        sql
    );
}

#[test]
fn test_from_yaml() {
    let mut recipe = Recipe::from_yaml(
        census(),
        r#"
metrics: [pop]
dimensions: state
filters:
  - adults
  - {field: sex, eq: F}
order_by: [-pop]
limit: 5
"#,
    )
    .unwrap();
    assert_eq!(recipe.metric_ids(), vec!["pop"]);
    assert_eq!(recipe.dimension_ids(), vec!["state"]);
    assert_eq!(recipe.filter_ids().len(), 2);
    let sql = recipe.to_sql().unwrap();
    assert!(sql.ends_with("ORDER BY SUM(\"pop2000\") DESC\nLIMIT 5"), "{}", sql);
    assert_parses(&sql, &GenericDialect {});
}

#[test]
fn test_from_yaml_bad_limit() {
    let err = Recipe::from_yaml(census(), "metrics: [pop]\nlimit: -1").unwrap_err();
    assert!(matches!(err, RecipeError::BadRecipe(BadRecipe::InvalidConfig(_))));
}

#[test]
fn test_with_settings() {
    let settings = Settings::from_toml("[recipe]\ndialect = \"mysql\"").unwrap();
    let mut recipe = Recipe::with_settings(census(), &settings)
        .unwrap()
        .metrics(["pop"])
        .unwrap();
    assert_eq!(recipe.current_dialect(), Dialect::MySql);
    assert_eq!(recipe.to_sql().unwrap(), "SELECT\n  SUM(`pop2000`) AS `pop`\nFROM `census`");
}

// =============================================================================
// Dirty tracking and caching
// =============================================================================

#[test]
fn test_query_is_cached_until_dirty() {
    let mut recipe = Recipe::new(census()).metrics(["pop"]).unwrap();
    let first = recipe.cache_key().unwrap();
    assert!(!recipe.is_dirty());
    assert_eq!(recipe.cache_key().unwrap(), first);

    recipe = recipe.dimensions(["state"]).unwrap();
    assert!(recipe.is_dirty());
    assert_ne!(recipe.cache_key().unwrap(), first);
}

#[test]
fn test_results_are_cached_until_dirty() {
    let rows = vec![Row::from_pairs([("state", Value::from("Vermont")), ("pop", Value::Int(7))])];
    let mut session = CannedSession::with_rows(rows);
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .dimensions(["state"])
        .unwrap();

    assert!(matches!(
        recipe.stats().unwrap_err(),
        RecipeError::BadRecipe(BadRecipe::StatsNotReady)
    ));

    let fetched = recipe.all(&mut session).unwrap().to_vec();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].get("state_id"), Some(&Value::from("Vermont")));
    let stats = recipe.stats().unwrap();
    assert_eq!(stats.rows, 1);
    assert!(!stats.from_cache);

    recipe.all(&mut session).unwrap();
    assert_eq!(session.calls, 1);
    assert!(recipe.stats().unwrap().from_cache);

    recipe = recipe.limit(1);
    recipe.all(&mut session).unwrap();
    assert_eq!(session.calls, 2);
    assert!(session.last_sql.unwrap().ends_with("LIMIT 1"));
}

#[test]
fn test_to_sql_then_all_still_fetches() {
    let mut session = CannedSession::default();
    let mut recipe = Recipe::new(census()).metrics(["pop"]).unwrap();
    recipe.to_sql().unwrap();
    assert!(recipe.all(&mut session).unwrap().is_empty());
    assert_eq!(session.calls, 1);
}

#[test]
fn test_formatted_results() {
    let shelf = census().with(
        "pop_fmt",
        Ingredient::metric(sum(col("pop2000"))).with_formatter(Formatter::custom("double", |v| {
            Ok(Value::Float(v.as_f64().unwrap_or_default() * 2.0))
        })),
    );
    let rows = vec![Row::from_pairs([("pop_fmt_raw", Value::Int(21))])];
    let mut session = CannedSession::with_rows(rows);
    let mut recipe = Recipe::new(shelf).metrics(["pop_fmt"]).unwrap();

    let sql = recipe.to_sql().unwrap();
    assert!(sql.contains(r#"AS "pop_fmt_raw""#), "{}", sql);
    let first = recipe.first(&mut session).unwrap().unwrap();
    assert_eq!(first.get("pop_fmt"), Some(&Value::Float(42.0)));
}

#[test]
fn test_session_errors_propagate() {
    let mut recipe = Recipe::new(census()).metrics(["pop"]).unwrap();
    let err = recipe.all(&mut BrokenSession).unwrap_err();
    assert_eq!(err.to_string(), "session failed: connection refused");
    assert!(recipe.stats().is_err());
}
