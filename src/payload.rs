//! Translation payload: translated values addressed by parsed field keys.
//!
//! The host hands payloads over in a nested string-keyed form
//! (`table → element id → field key → value`, see [`RawPayload`]). Inside this
//! crate every entry carries its parsed [`FieldKey`] instead.

use crate::error::RemapError;
use crate::remap::{FieldKey, RecordId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Nested payload form exchanged with the host.
pub type RawPayload = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// One translated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedField {
    /// Table of the source element.
    pub table: String,
    /// Id of the source (original-language) element.
    pub element_id: RecordId,
    /// Where the value goes.
    pub key: FieldKey,
    /// The translated value.
    pub value: String,
}

impl TranslatedField {
    pub fn new(table: &str, element_id: RecordId, key: FieldKey, value: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            element_id,
            key,
            value: value.into(),
        }
    }

    /// Parse the key of a raw entry.
    ///
    /// # Errors
    /// Returns [`RemapError::MalformedKey`] for keys with fewer than three segments.
    pub fn parse(
        table: &str,
        element_id: RecordId,
        raw_key: &str,
        value: impl Into<String>,
    ) -> Result<Self, RemapError> {
        Ok(Self::new(table, element_id, FieldKey::parse(raw_key)?, value))
    }

    /// Whether this entry belongs to `(table, element_id)`.
    pub fn belongs_to(&self, table: &str, element_id: RecordId) -> bool {
        self.element_id == element_id && self.table == table
    }
}

/// Ordered list of translated values, unique per `(table, element, key)`.
///
/// Entries are indexed by element and key, so lookups, inserts and re-keys do
/// not scan the list. A re-key onto an occupied key leaves an empty slot
/// behind; iteration skips it.
#[derive(Clone, Default)]
pub struct TranslationPayload {
    slots: Vec<Option<TranslatedField>>,
    index: HashMap<String, HashMap<RecordId, ElementSlots>>,
    len: usize,
}

/// Slots of one element: by key, and in insertion order.
#[derive(Debug, Clone, Default)]
struct ElementSlots {
    by_key: HashMap<FieldKey, usize>,
    order: Vec<usize>,
}

/// Iterator over the entries of a payload, in payload order.
pub type Iter<'a> = std::iter::Flatten<std::slice::Iter<'a, Option<TranslatedField>>>;

impl TranslationPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a nested payload, failing on the first malformed key or element id.
    ///
    /// # Errors
    /// Returns the first [`RemapError`] encountered.
    pub fn from_raw(raw: &RawPayload) -> Result<Self, RemapError> {
        let mut payload = Self::new();
        for (table, element_id, raw_key, value) in raw_entries(raw) {
            let element_id = parse_element_id(table, element_id)?;
            payload.insert(TranslatedField::parse(table, element_id, raw_key, value)?);
        }
        Ok(payload)
    }

    /// Parse a nested payload, skipping bad entries and returning their errors.
    pub fn from_raw_lenient(raw: &RawPayload) -> (Self, Vec<RemapError>) {
        let mut payload = Self::new();
        let mut errors = Vec::new();
        for (table, element_id, raw_key, value) in raw_entries(raw) {
            let parsed = parse_element_id(table, element_id)
                .and_then(|id| TranslatedField::parse(table, id, raw_key, value));
            match parsed {
                Ok(field) => payload.insert(field),
                Err(e) => errors.push(e),
            }
        }
        (payload, errors)
    }

    /// Back to the nested host form.
    pub fn to_raw(&self) -> RawPayload {
        let mut raw = RawPayload::new();
        for field in self {
            raw.entry(field.table.clone())
                .or_default()
                .entry(field.element_id.to_string())
                .or_default()
                .insert(field.key.to_string(), field.value.clone());
        }
        raw
    }

    /// Add an entry. An existing entry with the same element and key is
    /// overwritten in place.
    pub fn insert(&mut self, field: TranslatedField) {
        if let Some(index) = self.position(&field.table, field.element_id, &field.key) {
            if let Some(existing) = self.slots[index].as_mut() {
                existing.value = field.value;
            }
            return;
        }

        let index = self.slots.len();
        let element = self
            .index
            .entry(field.table.clone())
            .or_default()
            .entry(field.element_id)
            .or_default();
        element.by_key.insert(field.key.clone(), index);
        element.order.push(index);
        self.slots.push(Some(field));
        self.len += 1;
    }

    /// Move an entry to a new key. Any other entry already holding `new_key`
    /// for the same element takes the moved value and keeps its position.
    /// Returns false when `old_key` is absent.
    pub fn rekey(
        &mut self,
        table: &str,
        element_id: RecordId,
        old_key: &FieldKey,
        new_key: FieldKey,
    ) -> bool {
        let Some(element) = self
            .index
            .get_mut(table)
            .and_then(|elements| elements.get_mut(&element_id))
        else {
            return false;
        };
        let Some(index) = element.by_key.get(old_key).copied() else {
            return false;
        };
        if old_key == &new_key {
            return true;
        }

        element.by_key.remove(old_key);
        match element.by_key.get(&new_key).copied() {
            Some(existing) => {
                element.order.retain(|slot| *slot != index);
                if let Some(moved) = self.slots[index].take() {
                    if let Some(target) = self.slots[existing].as_mut() {
                        target.value = moved.value;
                    }
                }
                self.len -= 1;
            }
            None => {
                if let Some(field) = self.slots[index].as_mut() {
                    field.key = new_key.clone();
                }
                element.by_key.insert(new_key, index);
            }
        }
        true
    }

    pub fn get(&self, table: &str, element_id: RecordId, key: &FieldKey) -> Option<&str> {
        let index = self.position(table, element_id, key)?;
        self.slots[index].as_ref().map(|f| f.value.as_str())
    }

    /// Keys currently present for one element, in payload order.
    pub fn keys_of(&self, table: &str, element_id: RecordId) -> Vec<FieldKey> {
        let Some(element) = self.element(table, element_id) else {
            return Vec::new();
        };
        element
            .order
            .iter()
            .filter_map(|index| self.slots[*index].as_ref())
            .map(|f| f.key.clone())
            .collect()
    }

    /// Distinct element ids of one table, in first-seen order.
    pub fn element_ids(&self, table: &str) -> Vec<RecordId> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|f| f.table == table)
            .map(|f| f.element_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Entries whose locator is still a placeholder.
    pub fn placeholders(&self) -> impl Iterator<Item = &TranslatedField> + '_ {
        self.iter().filter(|f| f.key.locator.is_placeholder())
    }

    pub fn iter(&self) -> Iter<'_> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn element(&self, table: &str, element_id: RecordId) -> Option<&ElementSlots> {
        self.index.get(table)?.get(&element_id)
    }

    fn position(&self, table: &str, element_id: RecordId, key: &FieldKey) -> Option<usize> {
        self.element(table, element_id)?.by_key.get(key).copied()
    }
}

impl PartialEq for TranslationPayload {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for TranslationPayload {}

impl fmt::Debug for TranslationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Serialize for TranslationPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl FromIterator<TranslatedField> for TranslationPayload {
    fn from_iter<I: IntoIterator<Item = TranslatedField>>(iter: I) -> Self {
        let mut payload = Self::new();
        for field in iter {
            payload.insert(field);
        }
        payload
    }
}

impl IntoIterator for TranslationPayload {
    type Item = TranslatedField;
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Option<TranslatedField>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter().flatten()
    }
}

impl<'a> IntoIterator for &'a TranslationPayload {
    type Item = &'a TranslatedField;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn raw_entries(raw: &RawPayload) -> impl Iterator<Item = (&str, &str, &str, &str)> + '_ {
    raw.iter().flat_map(|(table, elements)| {
        elements.iter().flat_map(move |(element_id, fields)| {
            fields.iter().map(move |(key, value)| {
                (
                    table.as_str(),
                    element_id.as_str(),
                    key.as_str(),
                    value.as_str(),
                )
            })
        })
    })
}

fn parse_element_id(table: &str, raw: &str) -> Result<RecordId, RemapError> {
    raw.trim()
        .parse()
        .map_err(|_| RemapError::InvalidElementId {
            table: table.to_string(),
            value: raw.to_string(),
        })
}
