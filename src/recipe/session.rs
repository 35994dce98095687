//! Query execution seam.
//!
//! The recipe never talks to a database itself; a [`Session`] receives the
//! compiled query and hands back rows that were already fetched.

use crate::row::Row;
use crate::sql::{Dialect, Query};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("session failed: {message}")]
pub struct SessionError {
    pub message: String,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes compiled queries.
pub trait Session {
    fn fetch(&mut self, query: &Query, dialect: Dialect) -> Result<Vec<Row>, SessionError>;
}
