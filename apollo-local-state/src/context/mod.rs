//! Provide a [`Context`] for the local state request handler.
//!
//! The context is handed to every resolver of a request and passed along to the forward link.
//! It is cheap to clone, all clones share the same entries.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use tower::BoxError;

use crate::json_ext::Value;

/// Holds [`Context`] entries.
pub(crate) type Entries = Arc<DashMap<String, Value>>;

/// A map of arbitrary JSON values, for use by resolvers and by the links of the chain.
///
/// Context entries are keyed by string and deserialized on read.
#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub struct Context {
    // Allows adding custom entries to the context.
    entries: Entries,
}

impl Context {
    /// Create a new context.
    pub fn new() -> Self {
        Context {
            entries: Default::default(),
        }
    }

    /// Returns true if the context contains a value for the specified key.
    pub fn contains_key<K>(&self, key: K) -> bool
    where
        K: Into<String>,
    {
        self.entries.contains_key(&key.into())
    }

    /// Get a value from the context using the provided key.
    ///
    /// Semantics:
    ///  - If the operation fails, that's because we can't deserialize the value.
    ///  - If the operation succeeds, the value is an [`Option`].
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>, BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de>,
    {
        self.entries
            .get(&key.into())
            .map(|v| serde_json_bytes::from_value(v.value().clone()))
            .transpose()
            .map_err(|e| e.into())
    }

    /// Insert a value int the context using the provided key and value.
    ///
    /// Semantics:
    ///  - If the operation fails, then the pair has not been inserted.
    ///  - If the operation succeeds, the result is the old value as an [`Option`].
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<V>, BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de> + Serialize,
    {
        match serde_json_bytes::to_value(value) {
            Ok(value) => self
                .entries
                .insert(key.into(), value)
                .map(serde_json_bytes::from_value)
                .transpose()
                .map_err(|e| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a value in the context using the provided key and value.
    pub fn insert_json_value<K>(&self, key: K, value: Value)
    where
        K: Into<String>,
    {
        self.entries.insert(key.into(), value);
    }

    /// Get a json value from the context using the provided key.
    pub fn get_json_value<K>(&self, key: K) -> Option<Value>
    where
        K: Into<String>,
    {
        self.entries.get(&key.into()).map(|v| v.value().clone())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn test_context_insert_and_get() {
        let context = Context::new();
        assert!(context.insert("user_id", 7).unwrap().is_none());
        assert_eq!(context.insert("user_id", 8).unwrap(), Some(7));
        assert_eq!(context.get::<_, i32>("user_id").unwrap(), Some(8));
        assert!(context.contains_key("user_id"));
        assert!(context.get::<_, i32>("missing").unwrap().is_none());
        assert!(context.get::<_, String>("user_id").is_err());
    }

    #[test]
    fn test_context_clones_share_entries() {
        let context = Context::new();
        let clone = context.clone();
        clone.insert_json_value("cart", json!({ "items": 2 }));
        assert_eq!(
            context.get_json_value("cart"),
            Some(json!({ "items": 2 }))
        );
        assert_eq!(context.len(), 1);
    }
}
