//! Cache keys and their canonical form

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::warn;

/// A cache key: either used verbatim or built from named fields
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    /// Raw string key, used as-is
    Raw(String),
    /// Named fields, serialized in sorted order and hashed
    Structured(BTreeMap<String, Value>),
}

impl CacheKey {
    /// Build a structured key from `(field, value)` pairs
    pub fn structured<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        CacheKey::Structured(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Key made of the SHA-256 hex digest of `content`
    pub fn content_hash(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        CacheKey::Raw(hex::encode(hasher.finalize()))
    }

    /// Canonical string under which the entry is stored.
    ///
    /// Structured keys become the 32-char MD5 hex digest of their JSON form;
    /// identical fields always give the same key regardless of insertion order.
    pub fn canonical(&self) -> String {
        match self {
            CacheKey::Raw(key) => key.clone(),
            CacheKey::Structured(fields) => match serde_json::to_string(fields) {
                Ok(serialized) => format!("{:x}", md5::compute(serialized.as_bytes())),
                Err(e) => {
                    warn!("Failed to serialize structured cache key, using debug form: {}", e);
                    format!("{:?}", fields)
                }
            },
        }
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::Raw(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey::Raw(key)
    }
}

impl From<&CacheKey> for CacheKey {
    fn from(key: &CacheKey) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_key_is_verbatim() {
        assert_eq!(CacheKey::from("news:latest").canonical(), "news:latest");
    }

    #[test]
    fn test_structured_key_ignores_field_order() {
        let a = CacheKey::structured([("query", json!("rust")), ("max_results", json!(5))]);
        let b = CacheKey::structured([("max_results", json!(5)), ("query", json!("rust"))]);

        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical().len(), 32);
    }

    #[test]
    fn test_structured_key_distinguishes_values() {
        let a = CacheKey::structured([("query", "rust"), ("sort", "publishedAt")]);
        let b = CacheKey::structured([("query", "rust"), ("sort", "relevancy")]);
        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let key = CacheKey::content_hash("hello").canonical();
        assert_eq!(
            key,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
