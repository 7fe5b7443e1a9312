//! Hooks the host calls around committing an imported translation.

use crate::audit::AuditSink;
use crate::config::Config;
use crate::grid::{GridSynchronizer, SyncReport};
use crate::payload::TranslationPayload;
use crate::remap::{LanguageId, RemapOptions, RemapOutcome, RemapReport, Remapper};
use crate::store::{BatchExecutor, CommandMap, ExtensionRegistry, IdRemap, RecordStore};
use tracing::{debug, info};

/// What the host knows about the import being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportContext {
    /// Target language of the translation.
    pub language: LanguageId,
    /// The import overwrites the original-language records; nothing to remap.
    pub import_as_default_language: bool,
}

impl ImportContext {
    pub fn new(language: LanguageId) -> Self {
        Self {
            language,
            import_as_default_language: false,
        }
    }
}

pub struct TranslationProcessor<'a> {
    store: &'a dyn RecordStore,
    executor: &'a dyn BatchExecutor,
    audit: &'a dyn AuditSink,
    extensions: &'a dyn ExtensionRegistry,
    config: &'a Config,
}

impl<'a> TranslationProcessor<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        executor: &'a dyn BatchExecutor,
        audit: &'a dyn AuditSink,
        extensions: &'a dyn ExtensionRegistry,
        config: &'a Config,
    ) -> Self {
        Self {
            store,
            executor,
            audit,
            extensions,
            config,
        }
    }

    /// Remap the payload before the host commits it.
    pub fn process_before_saving(
        &self,
        context: &ImportContext,
        payload: TranslationPayload,
    ) -> RemapOutcome {
        if context.import_as_default_language {
            debug!("Importing as default language, payload left as is");
            return RemapOutcome {
                report: RemapReport {
                    entries: payload.len(),
                    unresolved: payload.placeholders().count(),
                    ..Default::default()
                },
                payload,
                commands: CommandMap::new(),
                id_remap: IdRemap::new(),
            };
        }

        let options = RemapOptions {
            language: context.language,
            synthesize_missing: self.config.pretranslate_missing_references,
            auto_unhide: self.config.auto_unhide,
            tables: self.config.tables.clone(),
        };
        Remapper::new(self.store, self.executor, self.audit, options).remap(payload)
    }

    /// Fix container relations of the committed payload. `None` when the grid
    /// extension is not installed or nothing applies.
    pub fn process_after_saving(
        &self,
        context: &ImportContext,
        payload: &TranslationPayload,
    ) -> Option<SyncReport> {
        if context.import_as_default_language {
            return None;
        }
        if !self.extensions.is_loaded(&self.config.grid_extension) {
            debug!(
                "Extension '{}' not loaded, skipping container sync",
                self.config.grid_extension
            );
            return None;
        }

        let auto_unhide = self.config.auto_unhide;
        let report = GridSynchronizer::new(
            self.store,
            self.executor,
            self.audit,
            self.config.tables.clone(),
        )
        .synchronize_containers(payload, context.language, auto_unhide);

        info!(
            "Container sync: {} element(s) checked, {} relocated",
            report.elements, report.relocated
        );
        Some(report)
    }
}

/// Fixed set of installed extensions.
#[derive(Debug, Clone, Default)]
pub struct StaticExtensions(Vec<String>);

impl StaticExtensions {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl ExtensionRegistry for StaticExtensions {
    fn is_loaded(&self, extension: &str) -> bool {
        self.0.iter().any(|name| name == extension)
    }
}
