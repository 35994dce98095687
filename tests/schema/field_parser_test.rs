use recipe::schema::{parse_field, Aggregation, ArithOp, FieldDescriptor};

#[test]
fn test_every_aggregation_keyword() {
    for aggregation in Aggregation::ALL {
        let text = format!("{}(score)", aggregation.keyword());
        let field = parse_field(&text, Aggregation::Sum).unwrap();
        assert_eq!(field.aggregation, aggregation, "{}", text);
        assert_eq!(field.value, "score");
    }
}

#[test]
fn test_keywords_are_case_insensitive() {
    let field = parse_field("MAX(score)", Aggregation::Sum).unwrap();
    assert_eq!(field.aggregation, Aggregation::Max);
}

#[test]
fn test_operator_chain_inside_wrapper() {
    let field = parse_field("sum(a + b - c)", Aggregation::None).unwrap();
    let expected = FieldDescriptor::new("a", Aggregation::Sum)
        .with_operator(ArithOp::Add, FieldDescriptor::new("b", Aggregation::None))
        .with_operator(ArithOp::Sub, FieldDescriptor::new("c", Aggregation::None));
    assert_eq!(field, expected);
}

#[test]
fn test_operator_chain_without_wrapper_takes_default() {
    let field = parse_field("pop2000/pop2008", Aggregation::Sum).unwrap();
    assert_eq!(field.aggregation, Aggregation::Sum);
    assert_eq!(field.value, "pop2000");
    assert_eq!(field.operators.len(), 1);
    assert_eq!(field.operators[0].operator, ArithOp::Div);
    assert_eq!(field.operators[0].field.value, "pop2008");
    assert!(!field.is_literal);
}

#[test]
fn test_aggregation_nests_one_level() {
    // The inner wrapper is plain text, not a second aggregation.
    let field = parse_field("sum(max(a))", Aggregation::None).unwrap();
    assert_eq!(field.aggregation, Aggregation::Sum);
    assert_eq!(field.value, "max(a)");
}

#[test]
fn test_literals() {
    let field = parse_field("2.5", Aggregation::None).unwrap();
    assert!(field.is_literal);

    let field = parse_field("-3", Aggregation::None).unwrap();
    assert!(field.is_literal);
    assert!(field.operators.is_empty());

    let field = parse_field("score*100", Aggregation::None).unwrap();
    assert!(!field.is_literal);
    assert!(field.operators[0].field.is_literal);
}

#[test]
fn test_dotted_reference() {
    let field = parse_field("census.state", Aggregation::None).unwrap();
    assert_eq!(field.value, "census.state");
    assert!(field.operators.is_empty());
}

#[test]
fn test_errors() {
    assert!(parse_field("   ", Aggregation::Sum).is_err());
    assert!(parse_field("sum()", Aggregation::Sum).is_err());

    let err = parse_field("squee(foo)", Aggregation::Sum).unwrap_err();
    assert_eq!(err.constraint, "unknown aggregation 'squee'");
}

#[test]
fn test_operator_chain_must_cover_input() {
    let cases = [
        ("a+(b)", "unexpected '+(b)' in field 'a+(b)'"),
        ("a*-b", "unexpected '*' in field 'a*-b'"),
        ("a+b)c", "unexpected ')c' in field 'a+b)c'"),
        ("sum(a + b ! c)", "unexpected '!c' in field 'a+b!c'"),
    ];
    for (text, constraint) in cases {
        let err = parse_field(text, Aggregation::Sum).unwrap_err();
        assert_eq!(err.constraint, constraint, "{}", text);
    }
}

#[test]
fn test_exponent_operand() {
    let field = parse_field("a+2.5e-3", Aggregation::None).unwrap();
    assert_eq!(field.value, "a");
    assert_eq!(field.operators.len(), 1);
    assert_eq!(field.operators[0].operator, ArithOp::Add);
    assert_eq!(field.operators[0].field.value, "2.5e-3");
    assert!(field.operators[0].field.is_literal);
}
