//! Audit sink for errors reported by the record-processing engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub severity: Severity,
    /// Subsystem that produced the entry, e.g. `localization`.
    pub category: &'static str,
    /// Short free-text label.
    pub label: String,
    /// Raw error lines from the engine.
    pub details: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        severity: Severity,
        category: &'static str,
        label: impl Into<String>,
        details: Vec<String>,
    ) -> Self {
        Self {
            severity,
            category,
            label: label.into(),
            details,
            recorded_at: Utc::now(),
        }
    }
}

/// Where audit entries go. The host backs this with its own system log.
pub trait AuditSink {
    fn write(&self, entry: AuditEntry);
}

/// Forwards entries to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write(&self, entry: AuditEntry) {
        match entry.severity {
            Severity::Info => info!(
                "[{}] {}: {:?}",
                entry.category, entry.label, entry.details
            ),
            Severity::Warning => warn!(
                "[{}] {}: {:?}",
                entry.category, entry.label, entry.details
            ),
            Severity::Error => error!(
                "[{}] {}: {:?}",
                entry.category, entry.label, entry.details
            ),
        }
    }
}

/// Keeps entries in memory, for tests and embedding hosts that inspect them.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn write(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
