//! Builds what the host commits from a remapped payload.
//!
//! Every entry becomes a field value in a [`DataMap`] row addressed by the
//! entry's locator. Structured fields are written into a nested JSON object
//! along their sub-path. Rows for `NEW` placeholders get a matching `Localize`
//! command so the engine creates the record first.

use crate::payload::TranslationPayload;
use crate::remap::{FieldKey, Locator, RecordId};
use crate::store::{CommandMap, DataMap, IdRemap, Instruction};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Separator between the segments of a structured sub-path.
pub const PATH_DELIMITER: char = '/';

/// Why an entry was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedField {
    pub table: String,
    pub element_id: RecordId,
    pub key: FieldKey,
    pub reason: String,
}

/// Data and commands for one import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportPlan {
    /// Field values per target record.
    pub data: DataMap,
    /// `Localize` for every placeholder row.
    pub commands: CommandMap,
    pub skipped: Vec<SkippedField>,
}

impl ImportPlan {
    /// Build the plan. Empty values are skipped unless `force_create_empty`.
    pub fn from_payload(payload: &TranslationPayload, force_create_empty: bool) -> Self {
        let mut plan = ImportPlan::default();

        for entry in payload {
            if !force_create_empty && entry.value.trim().is_empty() {
                plan.skipped.push(SkippedField {
                    table: entry.table.clone(),
                    element_id: entry.element_id,
                    key: entry.key.clone(),
                    reason: "empty translated value".to_string(),
                });
                continue;
            }

            if let Locator::New {
                language,
                original_id,
            } = entry.key.locator
            {
                plan.commands.insert(
                    &entry.key.table,
                    original_id,
                    Instruction::Localize { language },
                );
            }

            let row = plan
                .data
                .row_mut(&entry.key.table, entry.key.locator.clone());
            let value = Value::String(entry.value.clone());
            match entry.key.sub_path.as_deref() {
                Some(path) => {
                    let slot = row
                        .entry(entry.key.field.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    set_by_path(slot, path, value);
                }
                None => {
                    row.insert(entry.key.field.clone(), value);
                }
            }
        }

        debug!(
            "Import plan: {} command(s), {} skipped",
            plan.commands.len(),
            plan.skipped.len()
        );
        plan
    }

    /// Move placeholder rows to the ids created by the command run.
    ///
    /// Returns the placeholders that got no id; their rows are dropped because
    /// the host cannot commit values for a record that was never created.
    pub fn resolve_placeholders(&mut self, id_remap: &IdRemap) -> Vec<(String, Locator)> {
        let mut unresolved = Vec::new();

        for (table, locator) in self.data.locators() {
            let Locator::New { original_id, .. } = locator else {
                continue;
            };
            let Some(row) = self.data.remove_row(&table, &locator) else {
                continue;
            };

            match id_remap.get(&table, original_id) {
                Some(new_id) => {
                    self.data.row_mut(&table, Locator::Id(new_id)).extend(row);
                }
                None => {
                    warn!("Record {}:{} was not localized", table, original_id);
                    unresolved.push((table, locator));
                }
            }
        }

        unresolved
    }
}

/// Write `value` into `target` at a `/`-separated path, creating objects on the way.
/// Non-object values met on the path are replaced.
pub fn set_by_path(target: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path
        .split(PATH_DELIMITER)
        .filter(|s| !s.is_empty())
        .collect();
    let Some((last, parents)) = segments.split_last() else {
        *target = value;
        return;
    };

    let mut current = target;
    for segment in parents {
        current = object_mut(current)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(current).insert(last.to_string(), value);
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}
