use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Weak;

use apollo_compiler::ast;
use lru::LruCache;
use parking_lot::Mutex;

/// In memory cache of values derived from a parsed document, keyed by document identity.
///
/// Entries hold a weak handle on their document: an entry is only returned for the very
/// allocation it was computed from, and never keeps a document alive.
/// Documents are immutable, so entries are never invalidated, only evicted.
pub(crate) struct DocumentCache<V> {
    inner: Mutex<LruCache<usize, CacheEntry<V>>>,
}

struct CacheEntry<V> {
    document: Weak<ast::Document>,
    value: V,
}

impl<V> CacheEntry<V> {
    fn is_for(&self, document: &Arc<ast::Document>) -> bool {
        self.document
            .upgrade()
            .is_some_and(|cached| Arc::ptr_eq(&cached, document))
    }
}

fn key(document: &Arc<ast::Document>) -> usize {
    Arc::as_ptr(document) as usize
}

impl<V> DocumentCache<V>
where
    V: Clone,
{
    pub(crate) fn new(max_capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_capacity)),
        }
    }

    pub(crate) fn get(&self, document: &Arc<ast::Document>) -> Option<V> {
        let key = key(document);
        let mut inner = self.inner.lock();
        let stale = match inner.get(&key) {
            Some(entry) if entry.is_for(document) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if stale {
            inner.pop(&key);
        }
        None
    }

    /// Inserts a value unless one is already present for this document.
    ///
    /// Returns the cached value, which is the one passed in only if it was inserted.
    pub(crate) fn insert(&self, document: &Arc<ast::Document>, value: V) -> V {
        let key = key(document);
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.get(&key)
            && entry.is_for(document)
        {
            return entry.value.clone();
        }
        inner.put(
            key,
            CacheEntry {
                document: Arc::downgrade(document),
                value: value.clone(),
            },
        );
        value
    }

    /// Returns the cached value, or computes and caches it.
    ///
    /// The computation runs without holding the lock. When two callers race on the same
    /// document, both compute and the first insert is kept.
    pub(crate) fn get_or_try_insert_with<E>(
        &self,
        document: &Arc<ast::Document>,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(document) {
            return Ok(value);
        }
        let value = compute()?;
        Ok(self.insert(document, value))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
