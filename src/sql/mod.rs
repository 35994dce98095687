//! SQL generation: the relational-expression backend ingredients compile into.
//!
//! - [`expr`] - Expression AST and builder DSL
//! - [`query`] - single-table SELECT builder
//! - [`types`] - CAST target types
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;
pub mod types;


pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    avg, case_when, coalesce, col, count, count_distinct, func, lit_bool, lit_float, lit_int,
    lit_null, lit_str, max, min, sum, table_col, BinaryOperator, Expr, ExprExt, Literal,
    UnaryOperator,
};
pub use query::{LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Token, TokenStream};
pub use types::DataType;
