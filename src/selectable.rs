//! The table ingredients are built against.

use crate::error::BadIngredient;
use crate::sql::{col, table_col, DataType, Expr, TableRef};

/// A table plus (optionally) its typed columns.
///
/// With no columns declared, every bare name is accepted. Dotted names that
/// point at another table are never validated here; the recipe's single-table
/// check rejects them at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Selectable {
    table: TableRef,
    columns: Vec<(String, DataType)>,
}

impl Selectable {
    pub fn new(table: &str) -> Self {
        Self {
            table: TableRef::new(table),
            columns: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.table = self.table.with_schema(schema);
        self
    }

    pub fn with_column(mut self, name: &str, data_type: DataType) -> Self {
        self.columns.push((name.to_string(), data_type));
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[(String, DataType)] {
        &self.columns
    }

    pub fn column_type(&self, name: &str) -> Option<&DataType> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, dt)| dt)
    }

    /// Resolve a (possibly table-qualified) column name to an expression.
    pub fn column(&self, name: &str) -> Result<Expr, BadIngredient> {
        if name == "*" {
            return Ok(Expr::Wildcard);
        }
        let bare = match name.split_once('.') {
            Some((table, column)) if table != self.table.table => {
                return Ok(table_col(table, column));
            }
            Some((_, column)) => column,
            None => name,
        };
        if self.columns.is_empty() || self.column_type(bare).is_some() {
            Ok(col(bare))
        } else {
            Err(BadIngredient::UnknownColumn {
                table: self.table.table.clone(),
                column: bare.to_string(),
            })
        }
    }
}
