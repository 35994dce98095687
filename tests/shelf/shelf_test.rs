use recipe::config::Settings;
use recipe::error::{BadRecipe, RecipeError};
use recipe::ingredient::{Family, Ingredient};
use recipe::selectable::Selectable;
use recipe::shelf::Shelf;
use recipe::sql::{col, lit_int, sum, DataType, Dialect, ExprExt, SortDir};

fn census() -> Selectable {
    Selectable::new("census")
        .with_column("first", DataType::String)
        .with_column("last", DataType::String)
        .with_column("age", DataType::Int32)
}

fn mytable_shelf() -> Shelf {
    Shelf::new(census())
        .with("first", Ingredient::dimension(col("first")))
        .with("last", Ingredient::dimension(col("last")))
        .with("age", Ingredient::metric(sum(col("age"))))
}

fn sql_of(exprs: &[recipe::sql::Expr]) -> Vec<String> {
    exprs.iter().map(|e| e.to_sql(Dialect::DuckDb)).collect()
}

#[test]
fn test_age_and_first_scenario() {
    let shelf = mytable_shelf();
    let mut cauldron = shelf.empty_like();
    cauldron.use_ingredient(&shelf.resolve("age", &[Family::Metric]).unwrap());
    cauldron.use_ingredient(&shelf.resolve("first", &[Family::Dimension]).unwrap());

    let parts = cauldron.compile_parts().unwrap();
    let columns: Vec<String> = parts.columns.iter().map(|c| c.to_sql(Dialect::DuckDb)).collect();
    assert_eq!(columns, vec![r#"SUM("age") AS "age""#, r#""first" AS "first""#]);
    assert_eq!(sql_of(&parts.group_bys), vec![r#""first""#]);
    assert!(parts.filters.is_empty());
    assert!(parts.havings.is_empty());
}

#[test]
fn test_filter_scenario() {
    let shelf = mytable_shelf();
    let mut cauldron = shelf.empty_like();
    cauldron.use_ingredient(&shelf.get("first").unwrap());
    let filter = Ingredient::filter(col("age").gt(lit_int(2))).with_id("age_gt_2");
    cauldron.use_ingredient(&filter);

    let parts = cauldron.compile_parts().unwrap();
    assert_eq!(sql_of(&parts.filters), vec![r#""age" > 2"#]);
    assert_eq!(sql_of(&parts.group_bys), vec![r#""first""#]);
    assert!(parts.havings.is_empty());
}

#[test]
fn test_duplicate_filters_collapse() {
    let mut cauldron = mytable_shelf().empty_like();
    cauldron.use_ingredient(&Ingredient::filter(col("age").gt(lit_int(2))).with_id("a"));
    cauldron.use_ingredient(&Ingredient::filter(col("age").gt(lit_int(2))).with_id("b"));
    cauldron.use_ingredient(&Ingredient::having(sum(col("age")).gt(lit_int(9))).with_id("c"));
    let parts = cauldron.compile_parts().unwrap();
    assert_eq!(parts.filters.len(), 1);
    assert_eq!(parts.havings.len(), 1);
}

#[test]
fn test_assignment_copies() {
    let original = Ingredient::dimension(col("first")).with_id("original");
    let mut shelf = Shelf::new(census());
    shelf.insert("renamed", &original);
    shelf.insert("again", &original);

    assert_eq!(original.id, "original");
    assert_eq!(shelf.get("renamed").unwrap().id, "renamed");
    assert_eq!(shelf.get("again").unwrap().id, "again");
}

#[test]
fn test_resolve_errors() {
    let shelf = mytable_shelf();

    let err = shelf.resolve("first", &[Family::Metric]).unwrap_err();
    assert_eq!(err.to_string(), "'first' is a Dimension, expected Metric");

    let err = shelf.resolve("foo", &[Family::Dimension]).unwrap_err();
    assert!(matches!(err, RecipeError::BadRecipe(BadRecipe::UnknownIngredient(ref n)) if n == "foo"));

    let err = shelf.resolve(col("age"), &[Family::Filter]).unwrap_err();
    assert!(matches!(err, RecipeError::BadRecipe(BadRecipe::NeedsConstructor(_))));
}

#[test]
fn test_resolve_descending() {
    let shelf = mytable_shelf();
    let age = shelf.resolve("-age", &[Family::Metric]).unwrap();
    assert_eq!(age.id, "age");
    assert_eq!(age.ordering, SortDir::Desc);
    // The shelf copy is untouched.
    assert_eq!(shelf.get("age").unwrap().ordering, SortDir::Asc);
}

#[test]
fn test_use_order_ranks_ids() {
    let shelf = mytable_shelf();
    let mut cauldron = shelf.empty_like();
    for name in ["last", "age", "first"] {
        cauldron.use_ingredient(&shelf.get(name).unwrap());
    }
    assert_eq!(cauldron.dimension_ids(), vec!["last", "first"]);
    assert_eq!(cauldron.metric_ids(), vec!["age"]);
}

#[test]
fn test_display() {
    assert_eq!(
        mytable_shelf().to_string(),
        "(Metric)age SUM(\"age\")\n(Dimension)first \"first\"\n(Dimension)last \"last\""
    );
}

#[test]
fn test_anonymize_policy_is_stamped() {
    let mut shelf = mytable_shelf();
    assert!(!shelf.get("first").unwrap().anonymize);
    shelf.set_anonymize(true);
    assert!(shelf.get("first").unwrap().anonymize);
    shelf.insert("again", &Ingredient::dimension(col("first")));
    assert!(shelf.get("again").unwrap().anonymize);
}

#[test]
fn test_automatic_shelf() {
    let shelf = Shelf::automatic(census()).unwrap();
    assert_eq!(shelf.len(), 3);
    assert_eq!(shelf.get("first").unwrap().family(), Family::Dimension);
    assert_eq!(shelf.get("age").unwrap().family(), Family::Metric);
}

#[test]
fn test_from_yaml() {
    let shelf = Shelf::from_yaml(
        r#"
first:
  kind: Dimension
  field: first
age:
  field: age
teens:
  kind: Filter
  condition: {field: age, between: [13, 19]}
"#,
        census(),
        &Settings::default(),
    )
    .unwrap();
    assert_eq!(shelf.len(), 3);
    let teens = shelf.get("teens").unwrap();
    assert_eq!(sql_of(&teens.filters), vec![r#""age" BETWEEN 13 AND 19"#]);
}

#[test]
fn test_from_yaml_unknown_column() {
    let err = Shelf::from_yaml("age: {field: height}", census(), &Settings::default()).unwrap_err();
    assert_eq!(err.to_string(), "column 'height' does not exist on table 'census'");
}

#[test]
fn test_from_yaml_schema_error() {
    let err = Shelf::from_yaml("age: {field: age, format: [1]}", census(), &Settings::default()).unwrap_err();
    assert!(matches!(err, RecipeError::Schema(ref e) if e.path == "age.format"));
}
