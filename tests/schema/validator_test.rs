use recipe::schema::{
    Aggregation, ArithOp, ComparisonOp, Condition, FieldContext, FieldDescriptor, Operand,
    SchemaConfig, SchemaValidator,
};
use recipe::sql::DataType;
use recipe::value::Value;
use serde_yaml::Value as YamlValue;

fn yaml(text: &str) -> YamlValue {
    serde_yaml::from_str(text).unwrap()
}

fn validator() -> SchemaValidator {
    SchemaValidator::default()
}

// =============================================================================
// Fields
// =============================================================================

#[test]
fn test_string_and_mapping_agree() {
    let v = validator();
    let from_string = v
        .validate_field(&yaml("'max(a*b)'"), FieldContext::Aggregated)
        .unwrap();
    let from_mapping = v
        .validate_field(
            &yaml("{value: a, aggregation: max, operators: [{operator: mul, field: b}]}"),
            FieldContext::Aggregated,
        )
        .unwrap();
    assert_eq!(from_string, from_mapping);
}

#[test]
fn test_mapping_keys() {
    let field = validator()
        .validate_field(
            &yaml("{value: score, aggregation: avg, as: integer, default: 0}"),
            FieldContext::Aggregated,
        )
        .unwrap();
    let expected = FieldDescriptor::new("score", Aggregation::Avg)
        .with_cast(DataType::Int32)
        .with_default(0i64);
    assert_eq!(field, expected);
}

#[test]
fn test_operator_aliases() {
    let field = validator()
        .validate_field(
            &yaml("{value: a, operators: [{operator: add, field: b}, {operator: '/', field: c}]}"),
            FieldContext::Aggregated,
        )
        .unwrap();
    let ops: Vec<ArithOp> = field.operators.iter().map(|o| o.operator).collect();
    assert_eq!(ops, vec![ArithOp::Add, ArithOp::Div]);
}

#[test]
fn test_unknown_aggregation_has_path() {
    let err = validator()
        .validate_field(&yaml("{value: a, aggregation: squee}"), FieldContext::Aggregated)
        .unwrap_err();
    assert_eq!(err.path, "field.aggregation");
}

#[test]
fn test_unknown_cast() {
    let err = validator()
        .validate_field(&yaml("{value: a, as: frobnicate}"), FieldContext::Aggregated)
        .unwrap_err();
    assert_eq!(err.path, "field.as");
}

#[test]
fn test_default_must_be_scalar() {
    let err = validator()
        .validate_field(&yaml("{value: a, default: [1, 2]}"), FieldContext::Aggregated)
        .unwrap_err();
    assert_eq!(err.path, "field.default");
}

#[test]
fn test_configured_default_aggregation() {
    let v = SchemaValidator::new(SchemaConfig {
        default_aggregation: Aggregation::Count,
        ..SchemaConfig::default()
    });
    let field = v.validate_field(&yaml("id"), FieldContext::Aggregated).unwrap();
    assert_eq!(field.aggregation, Aggregation::Count);

    let field = v.validate_field(&yaml("id"), FieldContext::NonAggregated).unwrap();
    assert_eq!(field.aggregation, Aggregation::None);
}

#[test]
fn test_normalization_is_idempotent() {
    let v = validator();
    let inputs = [
        "'sum(a+b-c)'",
        "'2'",
        "{value: pop2000, condition: {field: state, in: [Vermont]}, as: float, default: 0}",
        "{value: a, operators: [{operator: '*', field: {value: b, aggregation: none}}]}",
        "{value: '42', _use_raw_value: true}",
    ];
    for input in inputs {
        let first = v.validate_field(&yaml(input), FieldContext::Aggregated).unwrap();
        let normalized = v.normalize_field(&yaml(input), FieldContext::Aggregated).unwrap();
        let second = v.validate_field(&normalized, FieldContext::Aggregated).unwrap();
        assert_eq!(first, second, "{}", input);
    }
}

// =============================================================================
// Conditions
// =============================================================================

#[test]
fn test_leaf_condition() {
    let condition = validator()
        .validate_condition(&yaml("{field: age, gte: 18}"), FieldContext::NonAggregated)
        .unwrap()
        .unwrap();
    assert_eq!(
        condition,
        Condition::leaf(
            FieldDescriptor::new("age", Aggregation::None),
            ComparisonOp::GreaterOrEqual,
            Value::Int(18),
        )
    );
}

#[test]
fn test_ge_and_le_aliases() {
    let v = validator();
    for (raw, op) in [
        ("{field: a, ge: 1}", ComparisonOp::GreaterOrEqual),
        ("{field: a, le: 1}", ComparisonOp::LessOrEqual),
        ("{field: a, notin: [1]}", ComparisonOp::NotIn),
    ] {
        match v.validate_condition(&yaml(raw), FieldContext::NonAggregated).unwrap() {
            Some(Condition::Leaf { op: found, .. }) => assert_eq!(found, op, "{}", raw),
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_nested_composites_keep_order() {
    let condition = validator()
        .validate_condition(
            &yaml("{or: [{field: a, eq: 1}, {and: [{field: b, eq: 2}, {field: c, eq: 3}]}]}"),
            FieldContext::NonAggregated,
        )
        .unwrap()
        .unwrap();
    assert_eq!(condition.referenced_columns(), vec!["a", "b", "c"]);
}

#[test]
fn test_set_operator_coerces_scalar() {
    let condition = validator()
        .validate_condition(&yaml("{field: state, in: Vermont}"), FieldContext::NonAggregated)
        .unwrap()
        .unwrap();
    match condition {
        Condition::Leaf { operand, .. } => {
            assert_eq!(operand, Operand::List(vec![Value::from("Vermont")]))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_condition_errors() {
    let v = validator();
    let cases = [
        ("{field: a, gt: [1, 2]}", "condition.gt"),
        ("{field: a, gt: 1, lt: 5}", "condition"),
        ("{field: a, between: [1]}", "condition.between"),
        ("{and: []}", "condition.and"),
        ("{and: [{field: a, eq: 1}], field: b}", "condition"),
    ];
    for (raw, path) in cases {
        let err = v
            .validate_condition(&yaml(raw), FieldContext::NonAggregated)
            .unwrap_err();
        assert_eq!(err.path, path, "{}", raw);
    }
}

#[test]
fn test_empty_condition() {
    let v = validator();
    assert!(v.validate_condition(&yaml("{}"), FieldContext::NonAggregated).unwrap().is_none());
    assert!(v.validate_condition(&yaml("~"), FieldContext::NonAggregated).unwrap().is_none());
}
