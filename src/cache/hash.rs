//! Content hashing for cache keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::sql::Dialect;

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing, so field order follows
/// the type's declaration. Returns 64 lowercase hex characters.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Identity of a compiled query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub dialect: Dialect,
    pub sql: String,
}

impl CacheKey {
    pub fn new(sql: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: sql.into(),
        }
    }

    pub fn digest(&self) -> Result<String, serde_json::Error> {
        compute_hash(self)
    }
}
