//! Placeholder reconciliation.
//!
//! After the command run, entries that were marked pending during the remap
//! pass are moved from their `NEW` placeholder to the id the engine created.

use crate::payload::TranslationPayload;
use crate::remap::{FieldKey, Locator, RecordId};
use crate::store::IdRemap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Which entries of a marked element to revisit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Every entry the element has at reconciliation time.
    AllFields,
    /// Only these keys.
    Fields(BTreeSet<FieldKey>),
}

/// Elements waiting for ids from the command run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSet {
    markers: BTreeMap<(String, RecordId), Marker>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every entry of an element. Overrides earlier per-field marks.
    pub fn mark_all(&mut self, table: &str, element_id: RecordId) {
        self.markers
            .insert((table.to_string(), element_id), Marker::AllFields);
    }

    /// Mark one entry. No effect if the whole element is already marked.
    pub fn mark_field(&mut self, table: &str, element_id: RecordId, key: FieldKey) {
        let marker = self
            .markers
            .entry((table.to_string(), element_id))
            .or_insert_with(|| Marker::Fields(BTreeSet::new()));
        if let Marker::Fields(keys) = marker {
            keys.insert(key);
        }
    }

    pub fn get(&self, table: &str, element_id: RecordId) -> Option<&Marker> {
        self.markers.get(&(table.to_string(), element_id))
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RecordId, &Marker)> + '_ {
        self.markers
            .iter()
            .map(|((table, id), marker)| (table.as_str(), *id, marker))
    }
}

/// Re-key marked entries to the ids in `id_remap`. Returns the number of moved entries.
///
/// Elements without a positive id in `id_remap` keep their placeholders.
pub fn reconcile(
    payload: &mut TranslationPayload,
    markers: &MarkerSet,
    id_remap: &IdRemap,
) -> usize {
    if markers.is_empty() {
        return 0;
    }
    let mut moved = 0;

    for (table, element_id, marker) in markers.iter() {
        let Some(new_id) = id_remap.get(table, element_id) else {
            debug!(
                "No id created for {}:{}, leaving its entries unresolved",
                table, element_id
            );
            continue;
        };

        let keys: Vec<FieldKey> = match marker {
            Marker::AllFields => payload.keys_of(table, element_id),
            Marker::Fields(keys) => keys.iter().cloned().collect(),
        };

        for key in keys {
            let new_key = key.with_locator(Locator::Id(new_id));
            if payload.rekey(table, element_id, &key, new_key) {
                moved += 1;
            }
        }
    }

    moved
}
