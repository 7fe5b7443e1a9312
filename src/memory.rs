//! In-memory record store.
//!
//! Implements both collaborator interfaces over a plain list of records so the
//! remap pipeline can run without a host system: the preview binary loads it
//! from a JSON snapshot and the integration tests build it inline.
//!
//! Localizations point at their original through `parent_field` (default
//! `l10n_parent`) and carry their language in the configured language column.

use crate::config::TableNames;
use crate::payload::RawPayload;
use crate::remap::{LanguageId, Locator, RecordId};
use crate::store::{
    BatchExecutor, CommandMap, DataMap, ExecutionReport, IdRemap, Instruction, Record,
    RecordStore,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default column pointing from a localization to its original.
pub const DEFAULT_PARENT_FIELD: &str = "l10n_parent";

pub struct MemoryStore {
    tables: TableNames,
    parent_field: String,
    state: RefCell<State>,
}

#[derive(Default)]
struct State {
    records: BTreeMap<String, Vec<Record>>,
    next_id: RecordId,
    command_runs: usize,
    update_runs: usize,
}

impl MemoryStore {
    pub fn new(tables: TableNames) -> Self {
        Self {
            tables,
            parent_field: DEFAULT_PARENT_FIELD.to_string(),
            state: RefCell::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Store pre-filled with `records` per table.
    pub fn with_records(tables: TableNames, records: BTreeMap<String, Vec<Record>>) -> Self {
        let store = Self::new(tables);
        for (table, rows) in records {
            for record in rows {
                store.insert(&table, record);
            }
        }
        store
    }

    pub fn insert(&self, table: &str, record: Record) {
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.max(record.id + 1);
        state
            .records
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    /// Full copy of one record.
    pub fn record(&self, table: &str, id: RecordId) -> Option<Record> {
        self.state
            .borrow()
            .records
            .get(table)?
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// All records of a table.
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.state
            .borrow()
            .records
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `submit_commands` calls so far.
    pub fn command_runs(&self) -> usize {
        self.state.borrow().command_runs
    }

    /// Number of `submit_field_updates` calls so far.
    pub fn update_runs(&self) -> usize {
        self.state.borrow().update_runs
    }

    fn localizations_of(
        &self,
        state: &State,
        table: &str,
        original_id: RecordId,
        language: LanguageId,
    ) -> Vec<Record> {
        state
            .records
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| {
                        r.int_field(&self.parent_field) == Some(original_id as i64)
                            && r.int_field(&self.tables.language_field) == Some(i64::from(language))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy `source` as a localization and return the new id.
    fn create_localization(
        &self,
        state: &mut State,
        table: &str,
        source: &Record,
        language: LanguageId,
        auto_unhide: bool,
    ) -> RecordId {
        let id = state.next_id;
        state.next_id += 1;

        let mut copy = source.clone();
        copy.id = id;
        copy.fields
            .insert(self.tables.language_field.clone(), language.into());
        copy.fields
            .insert(self.parent_field.clone(), source.id.into());
        if auto_unhide {
            copy.fields.insert("hidden".to_string(), 0.into());
        }

        state
            .records
            .entry(table.to_string())
            .or_default()
            .push(copy);
        id
    }

    /// Original-language references of `parent` (optionally one relation field).
    fn references_of(
        &self,
        state: &State,
        parent_table: &str,
        parent_id: RecordId,
        field: Option<&str>,
    ) -> Vec<Record> {
        let tables = &self.tables;
        state
            .records
            .get(&tables.reference_table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| {
                        r.str_field(&tables.reference_parent_table_field) == Some(parent_table)
                            && r.int_field(&tables.reference_parent_id_field)
                                == Some(parent_id as i64)
                            && r.int_field(&tables.language_field).unwrap_or(0) == 0
                            && field.map_or(true, |f| {
                                r.str_field(&tables.reference_parent_field_field) == Some(f)
                            })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Localize the references of `parent` that have no localization yet and
    /// attach them to `localized_parent`.
    #[allow(clippy::too_many_arguments)]
    fn localize_references(
        &self,
        state: &mut State,
        parent_table: &str,
        parent_id: RecordId,
        localized_parent: RecordId,
        field: Option<&str>,
        language: LanguageId,
        auto_unhide: bool,
        id_remap: &mut IdRemap,
    ) {
        let reference_table = self.tables.reference_table.clone();
        for reference in self.references_of(state, parent_table, parent_id, field) {
            if !self
                .localizations_of(state, &reference_table, reference.id, language)
                .is_empty()
            {
                continue;
            }
            let original_id = reference.id;
            let mut source = reference;
            source.fields.insert(
                self.tables.reference_parent_id_field.clone(),
                localized_parent.into(),
            );
            let new_id =
                self.create_localization(state, &reference_table, &source, language, auto_unhide);
            id_remap.insert(&reference_table, original_id, new_id as i64);
        }
    }

    fn localize(
        &self,
        state: &mut State,
        table: &str,
        id: RecordId,
        language: LanguageId,
        auto_unhide: bool,
        id_remap: &mut IdRemap,
    ) -> Result<(), String> {
        let source = state
            .records
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id == id))
            .cloned()
            .ok_or_else(|| format!("{}:{}: record not found", table, id))?;
        if !self.localizations_of(state, table, id, language).is_empty() {
            return Err(format!(
                "{}:{}: localization for language {} already exists",
                table, id, language
            ));
        }

        let new_id = self.create_localization(state, table, &source, language, auto_unhide);
        id_remap.insert(table, id, new_id as i64);
        debug!("Localized {}:{} as {}", table, id, new_id);

        self.localize_references(
            state, table, id, new_id, None, language, auto_unhide, id_remap,
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn synchronize(
        &self,
        state: &mut State,
        table: &str,
        id: RecordId,
        field: &str,
        language: LanguageId,
        auto_unhide: bool,
        id_remap: &mut IdRemap,
    ) -> Result<(), String> {
        let localized_parent = self
            .localizations_of(state, table, id, language)
            .first()
            .map(|r| r.id)
            .ok_or_else(|| {
                format!(
                    "{}:{}: cannot synchronize '{}', no localization for language {}",
                    table, id, field, language
                )
            })?;

        self.localize_references(
            state,
            table,
            id,
            localized_parent,
            Some(field),
            language,
            auto_unhide,
            id_remap,
        );
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn find_localizations(
        &self,
        table: &str,
        original_id: RecordId,
        language: LanguageId,
    ) -> Vec<Record> {
        let state = self.state.borrow();
        self.localizations_of(&state, table, original_id, language)
    }

    fn get_record(&self, table: &str, id: RecordId, fields: &[&str]) -> Option<Record> {
        let mut record = self.record(table, id)?;
        record.fields.retain(|name, _| fields.contains(&name.as_str()));
        Some(record)
    }
}

impl BatchExecutor for MemoryStore {
    fn submit_commands(&self, commands: &CommandMap, auto_unhide: bool) -> ExecutionReport {
        let mut state = self.state.borrow_mut();
        state.command_runs += 1;
        let mut report = ExecutionReport::default();

        for (table, id, instruction) in commands.iter() {
            let result = match instruction {
                Instruction::Localize { language } => self.localize(
                    &mut state,
                    table,
                    id,
                    *language,
                    auto_unhide,
                    &mut report.id_remap,
                ),
                Instruction::Synchronize { field, language } => self.synchronize(
                    &mut state,
                    table,
                    id,
                    field,
                    *language,
                    auto_unhide,
                    &mut report.id_remap,
                ),
            };
            if let Err(e) = result {
                report.errors.push(e);
            }
        }

        report
    }

    fn submit_field_updates(&self, updates: &DataMap, _auto_unhide: bool) -> ExecutionReport {
        let mut state = self.state.borrow_mut();
        state.update_runs += 1;
        let mut report = ExecutionReport::default();

        for (table, locator, fields) in updates.iter() {
            let Locator::Id(id) = locator else {
                report
                    .errors
                    .push(format!("{}:{}: cannot update a placeholder", table, locator));
                continue;
            };
            let record = state
                .records
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|r| r.id == *id));
            match record {
                Some(record) => record.fields.extend(fields.clone()),
                None => report
                    .errors
                    .push(format!("{}:{}: record not found", table, id)),
            }
        }

        report
    }
}

/// Records plus a raw translation payload, as read by the preview binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    /// Target language of the import.
    pub language: LanguageId,
    #[serde(default)]
    pub import_as_default_language: bool,
    /// Installed host extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Records per table.
    #[serde(default)]
    pub records: BTreeMap<String, Vec<Record>>,
    pub payload: RawPayload,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }

    /// Move the records into a fresh store.
    pub fn take_store(&mut self, tables: TableNames) -> MemoryStore {
        MemoryStore::with_records(tables, std::mem::take(&mut self.records))
    }
}
