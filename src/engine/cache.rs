use lru::LruCache;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, sync::Arc};

use super::FileCabinetRecord;

/// Number of distinct select results kept before the least recently used is dropped.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Memoizes select results keyed by the canonical rendering of their conditions.
///
/// ## Invalidation
/// Entries are never patched. Any write to the store clears the whole cache,
/// so a hit always reflects the records as they are now.
///
/// ## Sharing
/// Results are handed out as `Arc`s: a hit returns the very vector that was
/// stored, not a copy.
pub struct QueryCache {
    entries: Mutex<LruCache<String, Arc<Vec<FileCabinetRecord>>>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<FileCabinetRecord>>> {
        let mut entries = self.entries.lock();
        entries.get(key).cloned()
    }

    pub fn put(&self, key: String, records: Vec<FileCabinetRecord>) -> Arc<Vec<FileCabinetRecord>> {
        let records = Arc::new(records);
        self.entries.lock().put(key, records.clone());
        records
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            tracing::debug!(entries = entries.len(), "query cache cleared");
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn record(id: u32) -> FileCabinetRecord {
        FileCabinetRecord {
            id,
            first_name: "John".into(),
            last_name: "Smith".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 20).unwrap(),
            grade: 4,
            height: Decimal::new(18, 1),
            favourite_symbol: '$',
        }
    }

    #[test]
    fn hit_returns_the_stored_result() {
        let cache = QueryCache::default();
        let stored = cache.put("firstname='john' and lastname='smith'".into(), vec![record(1)]);
        let hit = cache.get("firstname='john' and lastname='smith'").unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
        assert!(cache.get("firstname='john'").is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = QueryCache::default();
        cache.put("a".into(), vec![record(1)]);
        cache.put("b".into(), vec![]);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = QueryCache::new(2);
        cache.put("a".into(), vec![]);
        cache.put("b".into(), vec![]);
        cache.get("a");
        cache.put("c".into(), vec![]);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }
}
