//! Dialect-agnostic SQL tokens. Queries and expressions lower to a
//! [`TokenStream`] which is written out once per dialect.

use super::dialect::{Dialect, SqlDialect};
use super::types::DataType;

/// Every element a compiled recipe query can contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    GroupBy,
    Having,
    OrderBy,
    Desc,
    Limit,
    Offset,
    Fetch,
    Next,
    Rows,
    Only,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    Between,
    IsNull,
    IsNotNull,
    Distinct,
    Cast,
    True,
    False,

    // Punctuation and operators
    Comma,
    Dot,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,

    // Layout
    Space,
    Newline,
    Indent(usize),

    /// Table, column or alias name.
    Ident(String),
    /// `schema.table`, or just `table`.
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    LitInt(i64),
    /// Non-finite values serialize as NULL.
    LitFloat(f64),
    LitString(String),
    LitBool(bool),
    LitNull,
    /// Function name, remapped per dialect.
    FunctionName(String),
    /// CAST target type, named per dialect.
    TypeName(DataType),
}

impl Token {
    /// Text of tokens that read the same in every dialect.
    fn fixed(&self) -> Option<&'static str> {
        let text = match self {
            Token::Select => "SELECT",
            Token::From => "FROM",
            Token::Where => "WHERE",
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
            Token::As => "AS",
            Token::GroupBy => "GROUP BY",
            Token::Having => "HAVING",
            Token::OrderBy => "ORDER BY",
            Token::Desc => "DESC",
            Token::Limit => "LIMIT",
            Token::Offset => "OFFSET",
            Token::Fetch => "FETCH",
            Token::Next => "NEXT",
            Token::Rows => "ROWS",
            Token::Only => "ONLY",
            Token::Case => "CASE",
            Token::When => "WHEN",
            Token::Then => "THEN",
            Token::Else => "ELSE",
            Token::End => "END",
            Token::In => "IN",
            Token::Between => "BETWEEN",
            Token::IsNull => "IS NULL",
            Token::IsNotNull => "IS NOT NULL",
            Token::Distinct => "DISTINCT",
            Token::Cast => "CAST",
            Token::True => "TRUE",
            Token::False => "FALSE",
            Token::LitNull => "NULL",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Eq => "=",
            Token::Ne => "<>",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Mul => "*",
            Token::Div => "/",
            Token::Space => " ",
            Token::Newline => "\n",
            _ => return None,
        };
        Some(text)
    }

    /// Append this token's text for `dialect` to `out`.
    fn write(&self, out: &mut String, dialect: Dialect) {
        if let Some(text) = self.fixed() {
            out.push_str(text);
            return;
        }
        match self {
            Token::Indent(n) => {
                for _ in 0..*n {
                    out.push_str("  ");
                }
            }
            Token::Ident(name) => out.push_str(&dialect.quote_identifier(name)),
            Token::QualifiedIdent { schema, name } => {
                if let Some(schema) = schema {
                    out.push_str(&dialect.quote_identifier(schema));
                    out.push('.');
                }
                out.push_str(&dialect.quote_identifier(name));
            }
            Token::LitInt(n) => out.push_str(&n.to_string()),
            Token::LitFloat(f) if f.is_finite() => out.push_str(ryu::Buffer::new().format_finite(*f)),
            Token::LitFloat(_) => out.push_str("NULL"),
            Token::LitString(s) => out.push_str(&dialect.quote_string(s)),
            Token::LitBool(b) => out.push_str(dialect.format_bool(*b)),
            Token::FunctionName(name) => {
                let name = dialect.remap_function(name).unwrap_or(name.as_str());
                out.push_str(&name.to_uppercase());
            }
            Token::TypeName(dt) => out.push_str(&dialect.emit_data_type(dt)),
            _ => {}
        }
    }

    pub fn serialize(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        self.write(&mut out, dialect);
        out
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            token.write(&mut out, dialect);
        }
        out
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
