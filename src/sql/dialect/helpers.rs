//! Shared helper functions for SQL dialect implementations.
//!
//! Dialects compose these to implement `SqlDialect` with minimal duplication.

use super::super::token::{Token, TokenStream};
use super::super::types::DataType;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// MySQL reads `\` as an escape inside literals, so backslashes are
/// doubled along with quotes.
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// Quote string with N prefix for Unicode (T-SQL).
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (T-SQL style).
/// Requires an ORDER BY clause.
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    ts.push(Token::Offset)
        .space()
        .push(Token::LitInt(offset.unwrap_or(0) as i64))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

// =============================================================================
// Function Remapping
// =============================================================================

/// Remap functions for MySQL.
pub fn remap_function_mysql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "DATE_PART" => Some("EXTRACT"),
        "NVL" | "ISNULL" => Some("IFNULL"),
        _ => None,
    }
}

/// Remap functions for T-SQL.
pub fn remap_function_tsql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "DATE_TRUNC" => Some("DATETRUNC"),
        "DATE_PART" => Some("DATEPART"),
        "LENGTH" => Some("LEN"),
        "NVL" | "IFNULL" => Some("ISNULL"),
        _ => None,
    }
}

// =============================================================================
// Data Type Emission
// =============================================================================

/// Cast target names for Postgres and DuckDB.
pub fn emit_data_type_ansi(dt: &DataType) -> String {
    dt.to_string()
}

/// Cast target names for MySQL, which only accepts a narrow set in CAST.
pub fn emit_data_type_mysql(dt: &DataType) -> String {
    match dt {
        DataType::Bool | DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            "SIGNED".into()
        }
        DataType::Float32 => "FLOAT".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::String | DataType::Varchar(_) | DataType::Uuid => "CHAR".into(),
        DataType::Char(n) => format!("CHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp | DataType::TimestampTz => "DATETIME".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Json => "JSON".into(),
    }
}

/// Cast target names for T-SQL.
pub fn emit_data_type_tsql(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BIT".into(),
        DataType::Int8 => "TINYINT".into(),
        DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INT".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "REAL".into(),
        DataType::Float64 => "FLOAT".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::String | DataType::Json => "NVARCHAR(MAX)".into(),
        DataType::Char(n) => format!("NCHAR({})", n),
        DataType::Varchar(u16::MAX) => "NVARCHAR(MAX)".into(),
        DataType::Varchar(n) => format!("NVARCHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "DATETIME2".into(),
        DataType::TimestampTz => "DATETIMEOFFSET".into(),
        DataType::Binary => "VARBINARY(MAX)".into(),
        DataType::Uuid => "UNIQUEIDENTIFIER".into(),
    }
}
