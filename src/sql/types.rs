//! Backend data types used as CAST targets.
//!
//! A field's `as` key names one of these types. Names are matched
//! case-insensitively and accept the common aliases of the supported
//! databases (`int4`, `float8`, `datetime2`, `nvarchar(max)`, ...).

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A backend data type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Fixed-precision decimal: (precision, scale).
    Decimal(u8, u8),
    /// Unbounded text.
    String,
    Char(u16),
    Varchar(u16),
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Binary,
    Json,
    Uuid,
}

impl DataType {
    /// Parse a type name, returning `None` for unknown names.
    ///
    /// ```ignore
    /// assert_eq!(DataType::parse("bigint"), Some(DataType::Int64));
    /// assert_eq!(DataType::parse("Decimal(18, 2)"), Some(DataType::Decimal(18, 2)));
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();

        if let Some(inner) = extract_parens(&s, "decimal").or_else(|| extract_parens(&s, "numeric"))
        {
            return parse_decimal_params(&inner);
        }

        if let Some(inner) = extract_parens(&s, "varchar")
            .or_else(|| extract_parens(&s, "character varying"))
            .or_else(|| extract_parens(&s, "nvarchar"))
        {
            return parse_length_param(&inner).map(DataType::Varchar);
        }

        if let Some(inner) = extract_parens(&s, "char")
            .or_else(|| extract_parens(&s, "character"))
            .or_else(|| extract_parens(&s, "nchar"))
        {
            return parse_length_param(&inner).map(DataType::Char);
        }

        match s.as_str() {
            "bool" | "boolean" | "bit" => Some(DataType::Bool),

            "tinyint" | "int1" => Some(DataType::Int8),
            "smallint" | "int2" | "int16" => Some(DataType::Int16),
            "int" | "integer" | "int4" | "int32" => Some(DataType::Int32),
            "bigint" | "int8" | "int64" | "biginteger" => Some(DataType::Int64),

            "real" | "float4" | "float32" => Some(DataType::Float32),
            "float" | "double" | "float8" | "float64" | "double precision" => {
                Some(DataType::Float64)
            }

            "decimal" | "numeric" | "number" => Some(DataType::Decimal(18, 2)),

            "text" | "string" | "clob" | "unicode" | "varchar" | "nvarchar" => {
                Some(DataType::String)
            }

            "date" => Some(DataType::Date),
            "time" => Some(DataType::Time),
            "timestamp" | "datetime" | "datetime2" => Some(DataType::Timestamp),
            "timestamptz" | "timestamp with time zone" | "datetimeoffset" => {
                Some(DataType::TimestampTz)
            }

            "binary" | "blob" | "bytea" | "varbinary" => Some(DataType::Binary),
            "json" | "jsonb" => Some(DataType::Json),
            "uuid" | "guid" | "uniqueidentifier" => Some(DataType::Uuid),

            _ => None,
        }
    }

    /// Canonical lowercase name; `DataType::parse(&t.name()) == Some(t)`.
    pub fn name(&self) -> String {
        self.to_string().to_lowercase()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Float32
                | DataType::Float64
                | DataType::Decimal(_, _)
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            DataType::String | DataType::Char(_) | DataType::Varchar(_)
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOLEAN"),
            DataType::Int8 => write!(f, "TINYINT"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INTEGER"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "REAL"),
            DataType::Float64 => write!(f, "DOUBLE PRECISION"),
            DataType::Decimal(p, s) => write!(f, "DECIMAL({}, {})", p, s),
            DataType::String => write!(f, "TEXT"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
            DataType::Binary => write!(f, "BYTEA"),
            DataType::Json => write!(f, "JSON"),
            DataType::Uuid => write!(f, "UUID"),
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        DataType::parse(&name)
            .ok_or_else(|| de::Error::custom(format!("unknown data type '{}'", name)))
    }
}

/// e.g. extract_parens("decimal(10,2)", "decimal") returns Some("10,2")
fn extract_parens(s: &str, prefix: &str) -> Option<String> {
    let rest = s.trim().strip_prefix(prefix)?.trim();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.to_string())
}

fn parse_decimal_params(inner: &str) -> Option<DataType> {
    let parts: Vec<&str> = inner.split(',').map(|s| s.trim()).collect();
    if parts.len() != 2 {
        return None;
    }
    let precision: u8 = parts[0].parse().ok()?;
    let scale: u8 = parts[1].parse().ok()?;
    Some(DataType::Decimal(precision, scale))
}

fn parse_length_param(inner: &str) -> Option<u16> {
    let inner = inner.trim();
    if inner.eq_ignore_ascii_case("max") {
        return Some(u16::MAX);
    }
    inner.parse().ok()
}
