//! Field and condition schema.
//!
//! - [`parser`] - field-string mini-grammar (`sum(a+b)`)
//! - [`field`] - normalized field descriptors
//! - [`condition`] - comparison leaves and `and`/`or` trees
//! - [`validator`] - recursive validation of raw mappings
//! - [`ingredient_spec`] - declarative shelf entries as tagged specs

pub mod condition;
pub mod error;
pub mod field;
pub mod ingredient_spec;
pub mod parser;
pub mod validator;

pub use condition::{Combinator, ComparisonOp, Condition, Operand};
pub use error::{SchemaError, SchemaResult};
pub use field::{Aggregation, ArithOp, FieldDescriptor, OperatorTerm};
pub use ingredient_spec::{
    parse_shelf, CommonSpec, ConditionSpec, DimensionSpec, ExtraField, IngredientSpec,
    MetricSpec, QuickfilterSpec,
};
pub use parser::parse_field;
pub use validator::{builtin_formats, FieldContext, SchemaConfig, SchemaValidator};
