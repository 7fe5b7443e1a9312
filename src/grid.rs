//! Container synchronization for grid layouts.
//!
//! When a content element inside a grid container is localized, the engine
//! copies its container pointer verbatim, so the localization ends up inside
//! the original-language container. This pass moves such localizations into
//! the localized container.

use crate::audit::{AuditEntry, AuditSink, Severity};
use crate::config::TableNames;
use crate::payload::TranslationPayload;
use crate::remap::{LanguageId, LocalizedIdCache, Locator, RecordId};
use crate::store::{BatchExecutor, DataMap, RecordStore};
use serde::Serialize;
use tracing::{debug, info};

/// Counters describing one synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Content elements inspected.
    pub elements: usize,
    /// Elements that sit inside a container.
    pub contained: usize,
    /// Localizations moved to a localized container.
    pub relocated: usize,
    /// Error lines reported by the engine.
    pub executor_errors: usize,
}

pub struct GridSynchronizer<'a> {
    store: &'a dyn RecordStore,
    executor: &'a dyn BatchExecutor,
    audit: &'a dyn AuditSink,
    tables: TableNames,
    localized: LocalizedIdCache,
}

impl<'a> GridSynchronizer<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        executor: &'a dyn BatchExecutor,
        audit: &'a dyn AuditSink,
        tables: TableNames,
    ) -> Self {
        Self {
            store,
            executor,
            audit,
            tables,
            localized: LocalizedIdCache::new(),
        }
    }

    /// Re-home localized content elements of `payload` whose container belongs
    /// to another language. All moves go to the engine as one field update.
    pub fn synchronize_containers(
        &mut self,
        payload: &TranslationPayload,
        language: LanguageId,
        auto_unhide: bool,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let mut updates = DataMap::new();
        let content_table = self.tables.content_table.clone();

        for element_id in payload.element_ids(&content_table) {
            report.elements += 1;
            if let Some((localized_id, container_id)) = self.relocation(element_id, language, &mut report) {
                debug!(
                    "Moving {}:{} into container {}",
                    content_table, localized_id, container_id
                );
                updates.set(
                    &content_table,
                    Locator::Id(localized_id),
                    &self.tables.container_field,
                    serde_json::Value::from(container_id),
                );
                report.relocated += 1;
            }
        }

        if !updates.is_empty() {
            info!("Relocating {} grid child element(s)", report.relocated);
            let execution = self.executor.submit_field_updates(&updates, auto_unhide);
            if !execution.errors.is_empty() {
                report.executor_errors = execution.errors.len();
                self.audit.write(AuditEntry::new(
                    Severity::Warning,
                    "grid",
                    "container sync errors",
                    execution.errors,
                ));
            }
        }

        report
    }

    /// `(localized element, localized container)` when the element's
    /// localization still points at a container of another language.
    fn relocation(
        &mut self,
        element_id: RecordId,
        language: LanguageId,
        report: &mut SyncReport,
    ) -> Option<(RecordId, RecordId)> {
        let tables = &self.tables;

        let element = self.store.get_record(
            &tables.content_table,
            element_id,
            &[tables.container_field.as_str()],
        )?;
        if element.int_field(&tables.container_field).unwrap_or(0) <= 0 {
            return None;
        }
        report.contained += 1;

        // Freshly created by the import, so not taken from the cache.
        let localization = self
            .store
            .find_localizations(&tables.content_table, element_id, language)
            .into_iter()
            .next()?;
        let container_ref = localization.int_field(&tables.container_field)?;
        let container_ref = u64::try_from(container_ref).ok().filter(|id| *id > 0)?;

        let container = self.store.get_record(
            &tables.content_table,
            container_ref,
            &["uid", tables.language_field.as_str()],
        )?;
        let container_language = container.int_field(&tables.language_field).unwrap_or(0);
        if container_language == i64::from(language) {
            return None;
        }

        let localized_container =
            self.localized
                .resolve(self.store, &tables.content_table, container.id, language);
        (localized_container > 0).then_some((localization.id, localized_container))
    }
}
