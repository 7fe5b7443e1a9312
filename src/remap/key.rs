//! Field key codec.
//!
//! A field key addresses one translated value: `table:locator:field[:path]`.
//! The locator is either a concrete record id or a `NEW/<language>/<originalId>`
//! placeholder for a localization that does not exist yet.

use crate::error::RemapError;
use std::fmt;

/// Separator between the top-level key segments.
pub const KEY_DELIMITER: char = ':';

/// Separator inside a placeholder locator.
pub const LOCATOR_DELIMITER: char = '/';

/// Marker opening a placeholder locator.
pub const NEW_MARKER: &str = "NEW";

/// Record identifier as used by the host record model.
pub type RecordId = u64;

/// Language identifier as used by the host record model.
pub type LanguageId = u32;

/// The record a translated value targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Locator {
    /// A concrete, positive record id.
    Id(RecordId),

    /// A localization of `original_id` in `language` that must be created first.
    New {
        language: LanguageId,
        original_id: RecordId,
    },

    /// Neither a positive id nor a well-formed `NEW` marker. Kept verbatim and
    /// handled like a placeholder.
    Opaque(String),
}

impl Locator {
    /// Placeholder pointing at a yet-to-be-created localization of `original_id`.
    pub fn new_localization(language: LanguageId, original_id: RecordId) -> Self {
        Locator::New {
            language,
            original_id,
        }
    }

    /// Parse a locator segment. Never fails: unrecognized text becomes `Opaque`.
    pub fn parse(raw: &str) -> Self {
        if let Some(id) = parse_canonical::<RecordId>(raw) {
            if id > 0 {
                return Locator::Id(id);
            }
        }

        let mut parts = raw.splitn(3, LOCATOR_DELIMITER);
        let marker = parts.next();
        let language = parts.next().and_then(parse_canonical::<LanguageId>);
        let original_id = parts.next().and_then(parse_canonical::<RecordId>);

        match (marker, language, original_id) {
            (Some(NEW_MARKER), Some(language), Some(original_id)) => Locator::New {
                language,
                original_id,
            },
            _ => Locator::Opaque(raw.to_string()),
        }
    }

    /// Concrete id, if this locator addresses an existing record.
    pub fn id(&self) -> Option<RecordId> {
        match self {
            Locator::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// True for `NEW` markers and for unrecognized locators.
    pub fn is_placeholder(&self) -> bool {
        !matches!(self, Locator::Id(_))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "{}", id),
            Locator::New {
                language,
                original_id,
            } => write!(
                f,
                "{}{}{}{}{}",
                NEW_MARKER, LOCATOR_DELIMITER, language, LOCATOR_DELIMITER, original_id
            ),
            Locator::Opaque(raw) => f.write_str(raw),
        }
    }
}

impl serde::Serialize for Locator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A parsed field key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    /// Table holding the target record.
    pub table: String,
    /// Which record of `table` receives the value.
    pub locator: Locator,
    /// Field of the target record.
    pub field: String,
    /// Path into a structured field value, e.g. `data/sDEF/lDEF/header/vDEF`.
    pub sub_path: Option<String>,
}

impl FieldKey {
    pub fn new(table: impl Into<String>, locator: Locator, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            locator,
            field: field.into(),
            sub_path: None,
        }
    }

    /// Set the structured sub-path. Empty paths are stored as `None`.
    pub fn with_sub_path(mut self, sub_path: impl Into<String>) -> Self {
        let sub_path = sub_path.into();
        self.sub_path = if sub_path.is_empty() {
            None
        } else {
            Some(sub_path)
        };
        self
    }

    /// Parse a key string.
    ///
    /// # Errors
    /// Returns [`RemapError::MalformedKey`] when fewer than three segments are present.
    pub fn parse(raw: &str) -> Result<Self, RemapError> {
        let segments: Vec<&str> = raw.splitn(4, KEY_DELIMITER).collect();
        if segments.len() < 3 {
            return Err(RemapError::MalformedKey {
                key: raw.to_string(),
                segments: segments.len(),
            });
        }

        let key = FieldKey::new(segments[0], Locator::parse(segments[1]), segments[2]);
        Ok(match segments.get(3) {
            Some(path) => key.with_sub_path(*path),
            None => key,
        })
    }

    /// Same key, addressing another record.
    pub fn with_locator(&self, locator: Locator) -> Self {
        Self {
            locator,
            ..self.clone()
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.table, KEY_DELIMITER, self.locator, KEY_DELIMITER, self.field
        )?;
        if let Some(path) = self.sub_path.as_deref().filter(|p| !p.is_empty()) {
            write!(f, "{}{}", KEY_DELIMITER, path)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for FieldKey {
    type Err = RemapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKey::parse(s)
    }
}

impl serde::Serialize for FieldKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse an unsigned decimal only if it prints back identically, so `05` or `+5`
/// are not mistaken for record ids.
fn parse_canonical<T>(raw: &str) -> Option<T>
where
    T: std::str::FromStr + ToString,
{
    let value = raw.parse::<T>().ok()?;
    (value.to_string() == raw).then_some(value)
}
