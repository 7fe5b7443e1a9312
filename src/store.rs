//! Interfaces to the host record model.
//!
//! The remapper never talks to storage or to the record-processing engine
//! directly. It reads through [`RecordStore`], writes through [`BatchExecutor`]
//! and asks [`ExtensionRegistry`] whether optional integrations are installed.

use crate::remap::{LanguageId, Locator, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored record: its id plus whichever fields were requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default, flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Read a field as an integer. Numeric strings are accepted, as the host
    /// stores relation columns either way.
    pub fn int_field(&self, field: &str) -> Option<i64> {
        match self.fields.get(field)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read a field as a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }
}

/// Read-only access to records and their localizations.
pub trait RecordStore {
    /// All localizations of `original_id` in `language`, in storage order.
    fn find_localizations(
        &self,
        table: &str,
        original_id: RecordId,
        language: LanguageId,
    ) -> Vec<Record>;

    /// One record, restricted to `fields` (the id is always present).
    fn get_record(&self, table: &str, id: RecordId, fields: &[&str]) -> Option<Record>;
}

/// Whether an optional host extension is installed.
pub trait ExtensionRegistry {
    fn is_loaded(&self, extension: &str) -> bool;
}

/// One command for the record-processing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Instruction {
    /// Create a localization of the record.
    Localize { language: LanguageId },
    /// Localize the record's missing inline children for one relation field.
    Synchronize { field: String, language: LanguageId },
}

/// Commands keyed by table and record id; one instruction per record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandMap(BTreeMap<String, BTreeMap<RecordId, Instruction>>);

impl CommandMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an instruction. A later instruction for the same record replaces the earlier one.
    pub fn insert(&mut self, table: &str, id: RecordId, instruction: Instruction) {
        self.0
            .entry(table.to_string())
            .or_default()
            .insert(id, instruction);
    }

    pub fn get(&self, table: &str, id: RecordId) -> Option<&Instruction> {
        self.0.get(table)?.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|records| records.is_empty())
    }

    /// Number of queued instructions across all tables.
    pub fn len(&self) -> usize {
        self.0.values().map(|records| records.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RecordId, &Instruction)> + '_ {
        self.0.iter().flat_map(|(table, records)| {
            records
                .iter()
                .map(move |(id, instruction)| (table.as_str(), *id, instruction))
        })
    }
}

/// Field values keyed by table, record locator and field name.
///
/// Rows are keyed by [`Locator`] so the same structure carries plain updates
/// (`Id`) and rows for records that still have to be created (`New`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataMap(BTreeMap<String, BTreeMap<Locator, BTreeMap<String, serde_json::Value>>>);

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, table: &str, locator: Locator, field: &str, value: serde_json::Value) {
        self.row_mut(table, locator).insert(field.to_string(), value);
    }

    /// Mutable access to one row, created empty if missing.
    pub fn row_mut(
        &mut self,
        table: &str,
        locator: Locator,
    ) -> &mut BTreeMap<String, serde_json::Value> {
        self.0
            .entry(table.to_string())
            .or_default()
            .entry(locator)
            .or_default()
    }

    pub fn get(&self, table: &str, locator: &Locator, field: &str) -> Option<&serde_json::Value> {
        self.0.get(table)?.get(locator)?.get(field)
    }

    /// Take a row out of the map.
    pub fn remove_row(
        &mut self,
        table: &str,
        locator: &Locator,
    ) -> Option<BTreeMap<String, serde_json::Value>> {
        self.0.get_mut(table)?.remove(locator)
    }

    /// Locators of every row, per table.
    pub fn locators(&self) -> Vec<(String, Locator)> {
        self.0
            .iter()
            .flat_map(|(table, rows)| rows.keys().map(move |l| (table.clone(), l.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|rows| rows.is_empty())
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&str, &Locator, &BTreeMap<String, serde_json::Value>)> + '_ {
        self.0.iter().flat_map(|(table, rows)| {
            rows.iter()
                .map(move |(locator, fields)| (table.as_str(), locator, fields))
        })
    }
}

/// Ids created by a command run: `table → original id → new id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdRemap(BTreeMap<String, BTreeMap<RecordId, i64>>);

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, original_id: RecordId, new_id: i64) {
        self.0
            .entry(table.to_string())
            .or_default()
            .insert(original_id, new_id);
    }

    /// The new id, only when the executor reported a positive one.
    pub fn get(&self, table: &str, original_id: RecordId) -> Option<RecordId> {
        let new_id = *self.0.get(table)?.get(&original_id)?;
        u64::try_from(new_id).ok().filter(|id| *id > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|ids| ids.is_empty())
    }
}

/// What came back from one executor call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// New ids for records created by the call (empty for field updates).
    pub id_remap: IdRemap,
    /// Engine error log; one line per failed instruction.
    pub errors: Vec<String>,
}

/// The host's batch record-processing engine.
///
/// Failures are reported in [`ExecutionReport::errors`], never raised.
pub trait BatchExecutor {
    /// Run a command map (localize / synchronize).
    fn submit_commands(&self, commands: &CommandMap, auto_unhide: bool) -> ExecutionReport;

    /// Apply plain field updates.
    fn submit_field_updates(&self, updates: &DataMap, auto_unhide: bool) -> ExecutionReport;
}
