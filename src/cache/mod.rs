//! Cache key hashing.
//!
//! A compiled recipe is identified by the SQL it renders and the dialect it
//! renders for. Callers that keep fetched rows between runs key them with
//! [`CacheKey::digest`].

mod hash;
pub use hash::{compute_hash, CacheKey};
