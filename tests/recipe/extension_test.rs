use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use recipe::error::{BadRecipe, RecipeError, RecipeResult};
use recipe::ingredient::{Formatter, Ingredient};
use recipe::recipe::{
    Anonymize, AutomaticFilters, Extension, QueryParts, Recipe, RecipeParts, Session, SessionError,
};
use recipe::row::Row;
use recipe::selectable::Selectable;
use recipe::shelf::Shelf;
use recipe::sql::{col, lit_int, sum, Dialect, ExprExt, Query};
use recipe::value::Value;

fn census() -> Shelf {
    Shelf::new(Selectable::new("census"))
        .with("state", Ingredient::dimension(col("state")))
        .with("sex", Ingredient::dimension(col("sex")))
        .with("pop", Ingredient::metric(sum(col("pop2000"))))
}

/// Records the checkpoints it sees into a shared log.
#[derive(Debug)]
struct Tracer {
    label: &'static str,
    log: Rc<RefCell<Vec<String>>>,
    dirty: bool,
}

impl Tracer {
    fn new(label: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            label,
            log: Rc::clone(log),
            dirty: true,
        }
    }

    fn note(&self, step: &str) {
        self.log.borrow_mut().push(format!("{}:{}", self.label, step));
    }
}

impl Extension for Tracer {
    fn name(&self) -> &str {
        self.label
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn add_ingredients(&mut self, _shelf: &Shelf, _cauldron: &mut Shelf) -> RecipeResult<()> {
        self.note("add");
        Ok(())
    }

    fn modify_recipe_parts(&mut self, parts: RecipeParts) -> RecipeResult<RecipeParts> {
        self.note("recipe");
        Ok(parts)
    }

    fn modify_prequery_parts(&mut self, parts: QueryParts) -> RecipeResult<QueryParts> {
        self.note("pre");
        Ok(parts)
    }

    fn modify_postquery_parts(&mut self, parts: QueryParts) -> RecipeResult<QueryParts> {
        self.note("post");
        Ok(parts)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Drops the FROM clause before the table check.
#[derive(Debug)]
struct Tableless;

impl Extension for Tableless {
    fn name(&self) -> &str {
        "tableless"
    }

    fn is_dirty(&self) -> bool {
        false
    }

    fn mark_clean(&mut self) {}

    fn modify_prequery_parts(&mut self, mut parts: QueryParts) -> RecipeResult<QueryParts> {
        parts.query.from = None;
        Ok(parts)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Caps every query at ten rows after the table check.
#[derive(Debug)]
struct TopTen;

impl Extension for TopTen {
    fn name(&self) -> &str {
        "top_ten"
    }

    fn is_dirty(&self) -> bool {
        false
    }

    fn mark_clean(&mut self) {}

    fn modify_recipe_parts(&mut self, mut parts: RecipeParts) -> RecipeResult<RecipeParts> {
        parts.havings.push(sum(col("pop2000")).gt(lit_int(0)));
        Ok(parts)
    }

    fn modify_postquery_parts(&mut self, mut parts: QueryParts) -> RecipeResult<QueryParts> {
        parts.query = parts.query.limit(10);
        Ok(parts)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Rows(Vec<Row>);

impl Session for Rows {
    fn fetch(&mut self, _: &Query, _: Dialect) -> Result<Vec<Row>, SessionError> {
        Ok(self.0.clone())
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[test]
fn test_checkpoint_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .extension(Tracer::new("a", &log))
        .extension(Tracer::new("b", &log));
    recipe.to_sql().unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["a:add", "b:add", "a:recipe", "b:recipe", "a:pre", "b:pre", "a:post", "b:post"]
    );
}

#[test]
fn test_dirty_extension_forces_recompile() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .extension(Tracer::new("a", &log));
    recipe.to_sql().unwrap();
    recipe.to_sql().unwrap();
    assert_eq!(log.borrow().len(), 4);

    recipe.extension_mut::<Tracer>().unwrap().dirty = true;
    assert!(recipe.is_dirty());
    recipe.to_sql().unwrap();
    assert_eq!(log.borrow().len(), 8);
    assert!(!recipe.is_dirty());
}

#[test]
fn test_parts_can_be_rewritten() {
    let mut recipe = Recipe::new(census()).metrics(["pop"]).unwrap().extension(TopTen);
    let sql = recipe.to_sql().unwrap();
    assert!(sql.contains("HAVING SUM(\"pop2000\") > 0"), "{}", sql);
    assert!(sql.ends_with("LIMIT 10"), "{}", sql);
}

#[test]
fn test_missing_table() {
    let err = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .extension(Tableless)
        .to_sql()
        .unwrap_err();
    assert!(matches!(err, RecipeError::BadRecipe(BadRecipe::NoTable)));
}

// =============================================================================
// AutomaticFilters
// =============================================================================

#[test]
fn test_automatic_filters() {
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .dimensions(["state"])
        .unwrap()
        .extension(
            AutomaticFilters::new()
                .with_filter("state", vec![Value::from("Vermont"), Value::from("Maine")])
                .with_filter("sex__ne", Value::from("M")),
        );
    let sql = recipe.to_sql().unwrap();
    assert!(
        sql.contains(r#"WHERE "sex" <> 'M' AND "state" IN ('Vermont', 'Maine')"#),
        "{}",
        sql
    );
    // The recipe's own selection is untouched.
    assert!(recipe.filter_ids().is_empty());
}

#[test]
fn test_automatic_filters_toggles() {
    let mut recipe = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .extension(AutomaticFilters::new().with_filter("state", Value::from("Vermont")));
    assert!(recipe.to_sql().unwrap().contains("WHERE"));

    recipe.extension_mut::<AutomaticFilters>().unwrap().set_apply(false);
    assert!(recipe.is_dirty());
    assert!(!recipe.to_sql().unwrap().contains("WHERE"));

    let ext = recipe.extension_mut::<AutomaticFilters>().unwrap();
    ext.set_apply(true);
    ext.exclude_keys(["state"]);
    assert!(!recipe.to_sql().unwrap().contains("WHERE"));

    let ext = recipe.extension_mut::<AutomaticFilters>().unwrap();
    ext.exclude_keys(Vec::<String>::new());
    ext.include_keys(["sex"]);
    assert!(!recipe.to_sql().unwrap().contains("WHERE"));
}

#[test]
fn test_automatic_filter_bad_operator() {
    let err = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .extension(AutomaticFilters::new().with_filter("state__in", Value::from("Vermont")))
        .to_sql()
        .unwrap_err();
    assert_eq!(err.to_string(), "'in' is not a valid operator for a scalar value");
}

#[test]
fn test_automatic_filter_on_metric_fails() {
    let err = Recipe::new(census())
        .metrics(["pop"])
        .unwrap()
        .extension(AutomaticFilters::new().with_filter("pop", Value::Int(3)))
        .to_sql()
        .unwrap_err();
    assert_eq!(err.to_string(), "'pop' is a Metric, expected Dimension");
}

// =============================================================================
// Anonymize
// =============================================================================

fn anonymized_shelf() -> Shelf {
    census().with(
        "name",
        Ingredient::dimension(col("name")).with_anonymizer(Formatter::custom("mask", |v| {
            Ok(Value::from("x".repeat(v.as_str().unwrap_or_default().len())))
        })),
    )
}

#[test]
fn test_anonymize_extension() {
    let mut recipe = Recipe::new(anonymized_shelf())
        .dimensions(["name"])
        .unwrap()
        .extension(Anonymize::new(true));

    let sql = recipe.to_sql().unwrap();
    assert!(sql.contains(r#""name" AS "name_raw""#), "{}", sql);

    let mut session = Rows(vec![Row::from_pairs([("name_raw", "Ann"), ("name", "Ann")])]);
    let fetched = recipe.all(&mut session).unwrap().to_vec();
    // `name` is already a column, so only the id is derived.
    assert_eq!(fetched[0].get("name_id"), Some(&Value::from("Ann")));

    recipe.extension_mut::<Anonymize>().unwrap().set(false);
    let sql = recipe.to_sql().unwrap();
    assert!(sql.contains(r#""name" AS "name""#), "{}", sql);
}

#[test]
fn test_anonymize_formats_values() {
    let mut recipe = Recipe::new(anonymized_shelf())
        .dimensions(["name"])
        .unwrap()
        .extension(Anonymize::new(true));
    let rows = vec![Row::from_pairs([("name_raw", "Ann")])];
    let fetched = recipe.all(&mut Rows(rows)).unwrap().to_vec();
    assert_eq!(fetched[0].get("name"), Some(&Value::from("xxx")));
    assert_eq!(fetched[0].get("name_id"), Some(&Value::from("Ann")));
}

#[test]
fn test_extension_lookup() {
    let recipe = Recipe::new(census()).extension(Anonymize::default());
    assert!(recipe.extension_ref::<Anonymize>().is_some());
    assert!(recipe.extension_ref::<AutomaticFilters>().is_none());
    assert!(!recipe.extension_ref::<Anonymize>().unwrap().enabled());
}
