use thiserror::Error;

/// Structural input errors raised while reading a translation payload.
///
/// Collaborator failures (a localize command that could not run, a field update
/// that was rejected) are not represented here. Those are written to the audit
/// sink and leave placeholders unresolved in the returned payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemapError {
    /// The field key has fewer than three `:`-separated segments.
    #[error("malformed field key '{key}': expected table:locator:field[:path], found {segments} segment(s)")]
    MalformedKey { key: String, segments: usize },

    /// An element identifier in the nested payload form is not a record id.
    #[error("invalid element id '{value}' in table '{table}'")]
    InvalidElementId { table: String, value: String },
}
