//! The remap pass.

use crate::audit::{AuditEntry, AuditSink, Severity};
use crate::config::TableNames;
use crate::payload::{TranslatedField, TranslationPayload};
use crate::remap::cache::{LocalizedIdCache, ReferenceCache, ReferenceRecord};
use crate::remap::reconcile::{reconcile, MarkerSet};
use crate::remap::{LanguageId, Locator, RecordId};
use crate::store::{BatchExecutor, CommandMap, IdRemap, Instruction, RecordStore};
use serde::Serialize;
use tracing::{debug, info};

/// Settings for one remap invocation.
#[derive(Debug, Clone)]
pub struct RemapOptions {
    /// Language being imported.
    pub language: LanguageId,
    /// Turn entries without a localization into `NEW` placeholders and
    /// pre-create missing reference parents.
    pub synthesize_missing: bool,
    /// Passed through to the command run.
    pub auto_unhide: bool,
    pub tables: TableNames,
}

impl RemapOptions {
    pub fn new(language: LanguageId) -> Self {
        Self {
            language,
            synthesize_missing: true,
            auto_unhide: false,
            tables: TableNames::default(),
        }
    }
}

/// Counters describing one remap invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemapReport {
    /// Entries read.
    pub entries: usize,
    /// Entries redirected to an existing localization.
    pub remapped: usize,
    /// Entries turned into `NEW` placeholders.
    pub synthesized: usize,
    /// Placeholders replaced by ids from the command run.
    pub reconciled: usize,
    /// Placeholders left in the output.
    pub unresolved: usize,
    /// Instructions sent to the engine (0 when no command run happened).
    pub commands_submitted: usize,
    /// Error lines reported by the engine.
    pub executor_errors: usize,
}

/// Result of [`Remapper::remap`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemapOutcome {
    /// Rewritten payload. May still contain placeholders; that is a valid outcome.
    pub payload: TranslationPayload,
    /// Commands queued during the pass.
    pub commands: CommandMap,
    /// Ids returned by the command run.
    pub id_remap: IdRemap,
    pub report: RemapReport,
}

/// Redirects translated entries to the localized records that actually exist.
///
/// One instance serves one import: its caches are never invalidated.
pub struct Remapper<'a> {
    store: &'a dyn RecordStore,
    executor: &'a dyn BatchExecutor,
    audit: &'a dyn AuditSink,
    options: RemapOptions,
    localized: LocalizedIdCache,
    references: ReferenceCache,
}

/// Mutable state of one pass.
#[derive(Default)]
struct PassState {
    output: TranslationPayload,
    commands: CommandMap,
    markers: MarkerSet,
    report: RemapReport,
}

impl<'a> Remapper<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        executor: &'a dyn BatchExecutor,
        audit: &'a dyn AuditSink,
        options: RemapOptions,
    ) -> Self {
        Self {
            store,
            executor,
            audit,
            options,
            localized: LocalizedIdCache::new(),
            references: ReferenceCache::new(),
        }
    }

    /// Rewrite every entry of `payload`, run the queued commands once, and move
    /// pending placeholders to the ids the engine created.
    pub fn remap(&mut self, payload: TranslationPayload) -> RemapOutcome {
        let mut state = PassState::default();

        for entry in payload {
            state.report.entries += 1;
            let entry = self.remap_entry(entry, &mut state);
            state.output.insert(entry);
        }

        let mut id_remap = IdRemap::new();
        if self.options.synthesize_missing && !state.commands.is_empty() {
            id_remap = self.run_commands(&state.commands, &mut state.report);
            state.report.reconciled = reconcile(&mut state.output, &state.markers, &id_remap);
        }

        state.report.unresolved = state.output.placeholders().count();

        let localized = self.localized.stats();
        let references = self.references.stats();
        debug!(
            "Localized-id cache {} hit(s) / {} miss(es) ({:.1}%), reference cache {:.1}%, {} element(s) marked pending",
            localized.hits,
            localized.misses,
            localized.hit_rate(),
            references.hit_rate(),
            state.markers.len()
        );
        info!(
            "Remapped {} entries for language {}: {} redirected, {} synthesized, {} reconciled, {} unresolved",
            state.report.entries,
            self.options.language,
            state.report.remapped,
            state.report.synthesized,
            state.report.reconciled,
            state.report.unresolved
        );

        RemapOutcome {
            payload: state.output,
            commands: state.commands,
            id_remap,
            report: state.report,
        }
    }

    fn remap_entry(&mut self, mut entry: TranslatedField, state: &mut PassState) -> TranslatedField {
        let language = self.options.language;

        match entry.key.locator.id() {
            Some(current) => {
                let localized = self.localized.resolve(
                    self.store,
                    &entry.key.table,
                    entry.element_id,
                    language,
                );

                if localized > 0 && localized != current {
                    debug!(
                        "Redirecting {} to localized record {}",
                        entry.key, localized
                    );
                    entry.key.locator = Locator::Id(localized);
                    state.report.remapped += 1;
                } else if localized == 0 && self.options.synthesize_missing {
                    entry.key.locator = Locator::new_localization(language, entry.element_id);
                    state.report.synthesized += 1;

                    if self.is_reference_table(&entry.table) {
                        self.pretranslate_parent(&entry, state);
                    }
                }
            }
            None => {
                if self.options.synthesize_missing && self.is_reference_table(&entry.table) {
                    self.synchronize_placeholder_parent(&entry, state);
                }
            }
        }

        entry
    }

    /// A reference entry got a `NEW` placeholder: make sure its parent gets the
    /// reference localized before the payload is committed.
    fn pretranslate_parent(&mut self, entry: &TranslatedField, state: &mut PassState) {
        let Some(reference) = self.reference(entry.element_id) else {
            return;
        };
        let language = self.options.language;
        let parent_localized = self.localized.resolve(
            self.store,
            &reference.parent_table,
            reference.parent_id,
            language,
        );

        if parent_localized > 0 {
            state.commands.insert(
                &reference.parent_table,
                reference.parent_id,
                Instruction::Synchronize {
                    field: reference.parent_field,
                    language,
                },
            );
        } else {
            state.commands.insert(
                &reference.parent_table,
                reference.parent_id,
                Instruction::Localize { language },
            );
            state
                .markers
                .mark_all(&reference.parent_table, reference.parent_id);
            state
                .markers
                .mark_field(&entry.table, entry.element_id, entry.key.clone());
        }
    }

    /// A reference entry arrived as a placeholder: if the parent is already
    /// localized, have the engine create the reference through the parent.
    fn synchronize_placeholder_parent(&mut self, entry: &TranslatedField, state: &mut PassState) {
        let language = self.options.language;
        let own = self
            .localized
            .resolve(self.store, &entry.key.table, entry.element_id, language);
        if own > 0 {
            return;
        }

        let Some(reference) = self.reference(entry.element_id) else {
            return;
        };
        let parent_localized = self.localized.resolve(
            self.store,
            &reference.parent_table,
            reference.parent_id,
            language,
        );

        if parent_localized > 0 {
            state.commands.insert(
                &reference.parent_table,
                reference.parent_id,
                Instruction::Synchronize {
                    field: reference.parent_field,
                    language,
                },
            );
        }
    }

    fn run_commands(&self, commands: &CommandMap, report: &mut RemapReport) -> IdRemap {
        info!("Submitting {} localization command(s)", commands.len());
        report.commands_submitted = commands.len();

        let execution = self
            .executor
            .submit_commands(commands, self.options.auto_unhide);

        if !execution.errors.is_empty() {
            report.executor_errors = execution.errors.len();
            self.audit.write(AuditEntry::new(
                Severity::Warning,
                "localization",
                "localization errors",
                execution.errors,
            ));
        }

        execution.id_remap
    }

    fn reference(&mut self, element_id: RecordId) -> Option<ReferenceRecord> {
        self.references
            .get(self.store, &self.options.tables, element_id)
    }

    fn is_reference_table(&self, table: &str) -> bool {
        table == self.options.tables.reference_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::remap::FieldKey;
    use crate::store::{DataMap, ExecutionReport, Record};
    use std::cell::RefCell;
    use std::collections::HashMap;

    // ==================== Test Doubles ====================

    #[derive(Default)]
    struct FakeStore {
        localizations: HashMap<(String, RecordId, LanguageId), Vec<RecordId>>,
        references: HashMap<RecordId, Record>,
        lookups: RefCell<usize>,
    }

    impl FakeStore {
        fn localized(mut self, table: &str, id: RecordId, language: LanguageId, to: RecordId) -> Self {
            self.localizations
                .entry((table.to_string(), id, language))
                .or_default()
                .push(to);
            self
        }

        fn reference(mut self, id: RecordId, parent_table: &str, parent_id: RecordId, field: &str) -> Self {
            self.references.insert(
                id,
                Record::new(id)
                    .with("tablenames", parent_table)
                    .with("uid_foreign", parent_id)
                    .with("fieldname", field),
            );
            self
        }
    }

    impl RecordStore for FakeStore {
        fn find_localizations(&self, table: &str, original_id: RecordId, language: LanguageId) -> Vec<Record> {
            *self.lookups.borrow_mut() += 1;
            self.localizations
                .get(&(table.to_string(), original_id, language))
                .map(|ids| ids.iter().map(|id| Record::new(*id)).collect())
                .unwrap_or_default()
        }

        fn get_record(&self, table: &str, id: RecordId, _fields: &[&str]) -> Option<Record> {
            (table == "sys_file_reference")
                .then(|| self.references.get(&id).cloned())
                .flatten()
        }
    }

    #[derive(Default)]
    struct FakeExecutor {
        result: IdRemap,
        errors: Vec<String>,
        calls: RefCell<Vec<CommandMap>>,
    }

    impl BatchExecutor for FakeExecutor {
        fn submit_commands(&self, commands: &CommandMap, _auto_unhide: bool) -> ExecutionReport {
            self.calls.borrow_mut().push(commands.clone());
            ExecutionReport {
                id_remap: self.result.clone(),
                errors: self.errors.clone(),
            }
        }

        fn submit_field_updates(&self, _updates: &DataMap, _auto_unhide: bool) -> ExecutionReport {
            ExecutionReport::default()
        }
    }

    fn payload(entries: &[(&str, RecordId, &str)]) -> TranslationPayload {
        entries
            .iter()
            .map(|(table, id, key)| {
                TranslatedField::new(table, *id, FieldKey::parse(key).unwrap(), "value")
            })
            .collect()
    }

    fn keys(payload: &TranslationPayload) -> Vec<String> {
        payload.iter().map(|f| f.key.to_string()).collect()
    }

    fn run(
        store: &FakeStore,
        executor: &FakeExecutor,
        language: LanguageId,
        input: TranslationPayload,
    ) -> RemapOutcome {
        let audit = MemoryAuditSink::new();
        Remapper::new(store, executor, &audit, RemapOptions::new(language)).remap(input)
    }

    // ==================== Concrete Locator Tests ====================

    #[test]
    fn test_direct_remap_to_existing_localization() {
        let store = FakeStore::default().localized("pages", 5, 2, 17);
        let executor = FakeExecutor::default();

        let outcome = run(&store, &executor, 2, payload(&[("pages", 5, "pages:5:title")]));

        assert_eq!(keys(&outcome.payload), vec!["pages:17:title"]);
        assert_eq!(outcome.report.remapped, 1);
        assert!(executor.calls.borrow().is_empty());
    }

    #[test]
    fn test_matching_localization_is_untouched() {
        let store = FakeStore::default().localized("pages", 5, 2, 17);
        let executor = FakeExecutor::default();

        let outcome = run(&store, &executor, 2, payload(&[("pages", 5, "pages:17:title:a/b")]));

        assert_eq!(keys(&outcome.payload), vec!["pages:17:title:a/b"]);
        assert_eq!(outcome.report.remapped, 0);
    }

    #[test]
    fn test_missing_localization_becomes_placeholder() {
        let store = FakeStore::default();
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            3,
            payload(&[("tt_content", 9, "tt_content:9:bodytext")]),
        );

        assert_eq!(keys(&outcome.payload), vec!["tt_content:NEW/3/9:bodytext"]);
        assert_eq!(outcome.report.synthesized, 1);
        assert_eq!(outcome.report.unresolved, 1);
        assert!(executor.calls.borrow().is_empty());
    }

    #[test]
    fn test_synthesis_disabled_keeps_key() {
        let store = FakeStore::default();
        let executor = FakeExecutor::default();
        let audit = MemoryAuditSink::new();
        let mut options = RemapOptions::new(3);
        options.synthesize_missing = false;

        let outcome = Remapper::new(&store, &executor, &audit, options)
            .remap(payload(&[("tt_content", 9, "tt_content:9:bodytext")]));

        assert_eq!(keys(&outcome.payload), vec!["tt_content:9:bodytext"]);
        assert_eq!(outcome.report.synthesized, 0);
    }

    #[test]
    fn test_lookup_uses_key_table_and_element_id() {
        // The key table differs from the owning table: resolution follows the key.
        let store = FakeStore::default().localized("pages_language_overlay", 5, 2, 40);
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("pages", 5, "pages_language_overlay:5:title")]),
        );

        assert_eq!(keys(&outcome.payload), vec!["pages_language_overlay:40:title"]);
    }

    #[test]
    fn test_lookup_is_cached_across_fields() {
        let store = FakeStore::default().localized("tt_content", 9, 2, 30);
        let executor = FakeExecutor::default();

        run(
            &store,
            &executor,
            2,
            payload(&[
                ("tt_content", 9, "tt_content:9:header"),
                ("tt_content", 9, "tt_content:9:bodytext"),
                ("tt_content", 9, "tt_content:9:subheader"),
            ]),
        );

        assert_eq!(*store.lookups.borrow(), 1);
    }

    // ==================== Reference Table Tests ====================

    #[test]
    fn test_reference_with_localized_parent_queues_synchronize() {
        let store = FakeStore::default()
            .reference(5, "tt_content", 9, "image")
            .localized("tt_content", 9, 2, 88);
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("sys_file_reference", 5, "sys_file_reference:5:title")]),
        );

        assert_eq!(keys(&outcome.payload), vec!["sys_file_reference:NEW/2/5:title"]);
        assert_eq!(
            outcome.commands.get("tt_content", 9),
            Some(&Instruction::Synchronize {
                field: "image".to_string(),
                language: 2
            })
        );
        assert_eq!(executor.calls.borrow().len(), 1);
        assert_eq!(outcome.report.reconciled, 0);
    }

    #[test]
    fn test_synchronized_reference_is_not_reconciled() {
        let store = FakeStore::default()
            .reference(5, "tt_content", 9, "image")
            .localized("tt_content", 9, 2, 88);
        let mut executor = FakeExecutor::default();
        executor.result.insert("sys_file_reference", 5, 61);

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("sys_file_reference", 5, "sys_file_reference:5:title")]),
        );

        assert_eq!(keys(&outcome.payload), vec!["sys_file_reference:NEW/2/5:title"]);
    }

    #[test]
    fn test_reference_with_missing_parent_localizes_and_reconciles() {
        let store = FakeStore::default().reference(5, "tt_content", 9, "image");
        let mut executor = FakeExecutor::default();
        executor.result.insert("tt_content", 9, 88);
        executor.result.insert("sys_file_reference", 5, 61);

        let outcome = run(
            &store,
            &executor,
            3,
            payload(&[
                ("tt_content", 9, "tt_content:9:bodytext"),
                ("sys_file_reference", 5, "sys_file_reference:5:title"),
            ]),
        );

        assert_eq!(
            outcome.commands.get("tt_content", 9),
            Some(&Instruction::Localize { language: 3 })
        );
        assert_eq!(
            keys(&outcome.payload),
            vec!["tt_content:88:bodytext", "sys_file_reference:61:title"]
        );
        assert_eq!(outcome.report.reconciled, 2);
        assert_eq!(outcome.report.unresolved, 0);
    }

    #[test]
    fn test_one_command_run_for_many_parents() {
        let store = FakeStore::default()
            .reference(5, "tt_content", 9, "image")
            .reference(6, "tt_content", 10, "image")
            .reference(7, "pages", 3, "media");
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[
                ("sys_file_reference", 5, "sys_file_reference:5:title"),
                ("sys_file_reference", 6, "sys_file_reference:6:title"),
                ("sys_file_reference", 7, "sys_file_reference:7:title"),
            ]),
        );

        assert_eq!(executor.calls.borrow().len(), 1);
        assert_eq!(outcome.report.commands_submitted, 3);
    }

    #[test]
    fn test_dangling_reference_is_plain_synthesis() {
        let store = FakeStore::default();
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("sys_file_reference", 5, "sys_file_reference:5:title")]),
        );

        assert_eq!(keys(&outcome.payload), vec!["sys_file_reference:NEW/2/5:title"]);
        assert!(outcome.commands.is_empty());
        assert!(executor.calls.borrow().is_empty());
    }

    #[test]
    fn test_placeholder_reference_with_localized_parent() {
        let store = FakeStore::default()
            .reference(5, "tt_content", 9, "image")
            .localized("tt_content", 9, 2, 88);
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("sys_file_reference", 5, "sys_file_reference:NEW/2/5:title")]),
        );

        assert!(matches!(
            outcome.commands.get("tt_content", 9),
            Some(Instruction::Synchronize { .. })
        ));
        assert_eq!(keys(&outcome.payload), vec!["sys_file_reference:NEW/2/5:title"]);
    }

    #[test]
    fn test_placeholder_reference_with_unlocalized_parent_is_left_alone() {
        let store = FakeStore::default().reference(5, "tt_content", 9, "image");
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("sys_file_reference", 5, "sys_file_reference:NEW/2/5:title")]),
        );

        assert!(outcome.commands.is_empty());
        assert!(executor.calls.borrow().is_empty());
    }

    #[test]
    fn test_placeholder_reference_already_localized_is_skipped() {
        let store = FakeStore::default()
            .reference(5, "tt_content", 9, "image")
            .localized("tt_content", 9, 2, 88)
            .localized("sys_file_reference", 5, 2, 61);
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("sys_file_reference", 5, "sys_file_reference:NEW/2/5:title")]),
        );

        assert!(outcome.commands.is_empty());
    }

    #[test]
    fn test_opaque_locator_treated_as_placeholder() {
        let store = FakeStore::default()
            .reference(5, "tt_content", 9, "image")
            .localized("tt_content", 9, 2, 88);
        let executor = FakeExecutor::default();

        let outcome = run(
            &store,
            &executor,
            2,
            payload(&[("sys_file_reference", 5, "sys_file_reference:bogus:title")]),
        );

        assert_eq!(keys(&outcome.payload), vec!["sys_file_reference:bogus:title"]);
        assert!(outcome.commands.get("tt_content", 9).is_some());
    }

    // ==================== Executor Failure Tests ====================

    #[test]
    fn test_executor_errors_go_to_audit_sink() {
        let store = FakeStore::default().reference(5, "tt_content", 9, "image");
        let executor = FakeExecutor {
            errors: vec!["record tt_content:9 could not be localized".to_string()],
            ..Default::default()
        };
        let audit = MemoryAuditSink::new();

        let outcome = Remapper::new(&store, &executor, &audit, RemapOptions::new(2))
            .remap(payload(&[("sys_file_reference", 5, "sys_file_reference:5:title")]));

        assert_eq!(outcome.report.executor_errors, 1);
        assert_eq!(outcome.report.unresolved, 1);
        assert_eq!(keys(&outcome.payload), vec!["sys_file_reference:NEW/2/5:title"]);

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(entries[0].label, "localization errors");
    }

    // ==================== Idempotence Tests ====================

    #[test]
    fn test_resolved_payload_is_stable() {
        let store = FakeStore::default()
            .localized("pages", 5, 2, 17)
            .localized("tt_content", 9, 2, 88);
        let executor = FakeExecutor::default();
        let input = payload(&[
            ("pages", 5, "pages:NEW/2/5:title"),
            ("pages", 5, "pages:5:nav_title"),
            ("tt_content", 9, "tt_content:9:header"),
        ]);

        let first = run(&store, &executor, 2, input);
        let second = run(&store, &executor, 2, first.payload.clone());

        assert_eq!(first.payload, second.payload);
    }
}
