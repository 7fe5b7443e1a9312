//! Memoized localization and reference lookups.
//!
//! Both caches live as long as one remapper instance. A key is looked up in the
//! store at most once; later changes in the store are not observed.

use crate::config::TableNames;
use crate::remap::{LanguageId, RecordId};
use crate::store::RecordStore;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Hit/miss counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// `(table, original id, language) → localized id`, 0 meaning "no localization".
#[derive(Debug, Default)]
pub struct LocalizedIdCache {
    entries: HashMap<(String, RecordId, LanguageId), RecordId>,
    stats: CacheStats,
}

impl LocalizedIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Localized id of `original_id` in `language`, or 0.
    ///
    /// If the store reports several localizations, the first one in store order wins.
    pub fn resolve(
        &mut self,
        store: &dyn RecordStore,
        table: &str,
        original_id: RecordId,
        language: LanguageId,
    ) -> RecordId {
        let key = (table.to_string(), original_id, language);
        if let Some(id) = self.entries.get(&key) {
            self.stats.hits += 1;
            return *id;
        }

        self.stats.misses += 1;
        let localizations = store.find_localizations(table, original_id, language);
        if localizations.len() > 1 {
            debug!(
                "{} localizations of {}:{} in language {}, using the first",
                localizations.len(),
                table,
                original_id,
                language
            );
        }
        let id = localizations.first().map(|r| r.id).unwrap_or(0);
        self.entries.insert(key, id);
        id
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Parent pointer of a reference record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    /// Table of the record the reference belongs to.
    pub parent_table: String,
    pub parent_id: RecordId,
    /// Relation field of the parent holding the reference.
    pub parent_field: String,
}

/// `reference id → parent pointer`, `None` for dangling or incomplete references.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    entries: HashMap<RecordId, Option<ReferenceRecord>>,
    stats: CacheStats,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &mut self,
        store: &dyn RecordStore,
        tables: &TableNames,
        reference_id: RecordId,
    ) -> Option<ReferenceRecord> {
        if let Some(entry) = self.entries.get(&reference_id) {
            self.stats.hits += 1;
            return entry.clone();
        }

        self.stats.misses += 1;
        let fields = [
            tables.reference_parent_id_field.as_str(),
            tables.reference_parent_table_field.as_str(),
            tables.reference_parent_field_field.as_str(),
        ];
        let entry = store
            .get_record(&tables.reference_table, reference_id, &fields)
            .and_then(|record| {
                let parent_id = record.int_field(&tables.reference_parent_id_field)?;
                Some(ReferenceRecord {
                    parent_table: record
                        .str_field(&tables.reference_parent_table_field)?
                        .to_string(),
                    parent_id: u64::try_from(parent_id).ok().filter(|id| *id > 0)?,
                    parent_field: record
                        .str_field(&tables.reference_parent_field_field)
                        .unwrap_or_default()
                        .to_string(),
                })
            });

        self.entries.insert(reference_id, entry.clone());
        entry
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;
    use std::cell::RefCell;

    /// Store answering from fixed tables and counting calls.
    #[derive(Default)]
    struct CountingStore {
        localizations: Vec<(String, RecordId, LanguageId, Vec<RecordId>)>,
        records: Vec<(String, Record)>,
        localization_calls: RefCell<Vec<(String, RecordId, LanguageId)>>,
        record_calls: RefCell<usize>,
    }

    impl RecordStore for CountingStore {
        fn find_localizations(
            &self,
            table: &str,
            original_id: RecordId,
            language: LanguageId,
        ) -> Vec<Record> {
            self.localization_calls
                .borrow_mut()
                .push((table.to_string(), original_id, language));
            self.localizations
                .iter()
                .find(|(t, id, lang, _)| t == table && *id == original_id && *lang == language)
                .map(|(_, _, _, ids)| ids.iter().map(|id| Record::new(*id)).collect())
                .unwrap_or_default()
        }

        fn get_record(&self, table: &str, id: RecordId, _fields: &[&str]) -> Option<Record> {
            *self.record_calls.borrow_mut() += 1;
            self.records
                .iter()
                .find(|(t, r)| t == table && r.id == id)
                .map(|(_, r)| r.clone())
        }
    }

    // ==================== LocalizedIdCache Tests ====================

    #[test]
    fn test_resolve_returns_localized_id() {
        let store = CountingStore {
            localizations: vec![("pages".to_string(), 5, 2, vec![17])],
            ..Default::default()
        };
        let mut cache = LocalizedIdCache::new();
        assert_eq!(cache.resolve(&store, "pages", 5, 2), 17);
    }

    #[test]
    fn test_resolve_queries_store_once_per_key() {
        let store = CountingStore {
            localizations: vec![("pages".to_string(), 5, 2, vec![17])],
            ..Default::default()
        };
        let mut cache = LocalizedIdCache::new();

        for _ in 0..5 {
            assert_eq!(cache.resolve(&store, "pages", 5, 2), 17);
        }

        assert_eq!(store.localization_calls.borrow().len(), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 4, misses: 1 });
    }

    #[test]
    fn test_resolve_memoizes_missing_localization() {
        let store = CountingStore::default();
        let mut cache = LocalizedIdCache::new();

        assert_eq!(cache.resolve(&store, "tt_content", 9, 3), 0);
        assert_eq!(cache.resolve(&store, "tt_content", 9, 3), 0);
        assert_eq!(store.localization_calls.borrow().len(), 1);
    }

    #[test]
    fn test_resolve_distinguishes_language_and_table() {
        let store = CountingStore {
            localizations: vec![
                ("pages".to_string(), 5, 2, vec![17]),
                ("pages".to_string(), 5, 3, vec![18]),
            ],
            ..Default::default()
        };
        let mut cache = LocalizedIdCache::new();

        assert_eq!(cache.resolve(&store, "pages", 5, 2), 17);
        assert_eq!(cache.resolve(&store, "pages", 5, 3), 18);
        assert_eq!(cache.resolve(&store, "tt_content", 5, 2), 0);
        assert_eq!(store.localization_calls.borrow().len(), 3);
    }

    #[test]
    fn test_resolve_first_localization_wins() {
        let store = CountingStore {
            localizations: vec![("pages".to_string(), 5, 2, vec![31, 17])],
            ..Default::default()
        };
        let mut cache = LocalizedIdCache::new();
        assert_eq!(cache.resolve(&store, "pages", 5, 2), 31);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        assert_eq!(CacheStats { hits: 3, misses: 1 }.hit_rate(), 75.0);
    }

    // ==================== ReferenceCache Tests ====================

    fn reference(id: RecordId, parent_table: &str, parent_id: i64, field: &str) -> Record {
        Record::new(id)
            .with("tablenames", parent_table)
            .with("uid_foreign", parent_id)
            .with("fieldname", field)
    }

    #[test]
    fn test_reference_lookup() {
        let store = CountingStore {
            records: vec![(
                "sys_file_reference".to_string(),
                reference(5, "tt_content", 9, "image"),
            )],
            ..Default::default()
        };
        let mut cache = ReferenceCache::new();

        let found = cache.get(&store, &TableNames::default(), 5).unwrap();
        assert_eq!(
            found,
            ReferenceRecord {
                parent_table: "tt_content".to_string(),
                parent_id: 9,
                parent_field: "image".to_string(),
            }
        );
    }

    #[test]
    fn test_reference_lookup_memoizes_absent_record() {
        let store = CountingStore::default();
        let mut cache = ReferenceCache::new();
        let tables = TableNames::default();

        assert!(cache.get(&store, &tables, 5).is_none());
        assert!(cache.get(&store, &tables, 5).is_none());
        assert_eq!(*store.record_calls.borrow(), 1);
    }

    #[test]
    fn test_reference_without_parent_is_dangling() {
        let store = CountingStore {
            records: vec![(
                "sys_file_reference".to_string(),
                reference(5, "tt_content", 0, "image"),
            )],
            ..Default::default()
        };
        let mut cache = ReferenceCache::new();
        assert!(cache.get(&store, &TableNames::default(), 5).is_none());
    }
}
