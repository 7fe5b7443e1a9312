//! Preview binary - runs an import snapshot through both save hooks against an
//! in-memory store and prints what the host would commit.
//!
//! Usage:
//!   cargo run --bin preview -- snapshot.json            # Abort on malformed keys
//!   cargo run --bin preview -- snapshot.json --lenient  # Skip malformed keys
//!
//! The snapshot is a JSON object with `language`, `records` (per table),
//! `payload` (table → element id → key → value) and optionally `extensions`
//! and `import_as_default_language`.
//!
//! Optional environment variables: see `Config::from_env` (L10N_*).

use anyhow::{Context, Result};
use l10n_remap::audit::TracingAuditSink;
use l10n_remap::grid::SyncReport;
use l10n_remap::import::ImportPlan;
use l10n_remap::memory::Snapshot;
use l10n_remap::processor::StaticExtensions;
use l10n_remap::remap::RemapReport;
use l10n_remap::store::{BatchExecutor, CommandMap, DataMap, Record};
use l10n_remap::{Config, ImportContext, RawPayload, TranslationPayload, TranslationProcessor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Everything printed at the end of a run.
#[derive(Serialize)]
struct PreviewOutput {
    payload: RawPayload,
    commands: CommandMap,
    data: DataMap,
    remap: RemapReport,
    grid: Option<SyncReport>,
    records: BTreeMap<String, Vec<Record>>,
}

fn main() -> Result<()> {
    // Load environment from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("l10n_remap=info".parse()?),
        )
        .init();

    // Parse CLI arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let lenient = args.iter().any(|arg| arg == "--lenient");
    let path: PathBuf = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
        .context("Usage: preview <snapshot.json> [--lenient]")?;

    info!("Loading configuration...");
    let config = Config::from_env()?;

    let mut snapshot = Snapshot::load(&path)?;
    let table_names: Vec<String> = snapshot.records.keys().cloned().collect();
    let store = snapshot.take_store(config.tables.clone());
    let extensions = StaticExtensions::new(snapshot.extensions.iter().cloned());
    let audit = TracingAuditSink;

    let payload = if lenient {
        let (payload, rejected) = TranslationPayload::from_raw_lenient(&snapshot.payload);
        for error in &rejected {
            warn!("Skipping entry: {}", error);
        }
        payload
    } else {
        TranslationPayload::from_raw(&snapshot.payload).context("Invalid translation payload")?
    };
    info!("Loaded {} translated field(s)", payload.len());

    let context = ImportContext {
        language: snapshot.language,
        import_as_default_language: snapshot.import_as_default_language,
    };
    let processor = TranslationProcessor::new(&store, &store, &audit, &extensions, &config);

    // Step 1: remap before saving
    let outcome = processor.process_before_saving(&context, payload);
    info!(
        "Remapped {} of {} entries ({} unresolved)",
        outcome.report.remapped + outcome.report.reconciled,
        outcome.report.entries,
        outcome.report.unresolved
    );

    // Step 2: commit, the way the host would
    let mut plan = ImportPlan::from_payload(&outcome.payload, config.force_create_empty);
    if !plan.commands.is_empty() {
        let execution = store.submit_commands(&plan.commands, config.auto_unhide);
        for error in &execution.errors {
            warn!("Localize failed: {}", error);
        }
        for (table, locator) in plan.resolve_placeholders(&execution.id_remap) {
            warn!("Dropping values for {}:{}", table, locator);
        }
    }
    if !plan.data.is_empty() {
        let execution = store.submit_field_updates(&plan.data, config.auto_unhide);
        for error in &execution.errors {
            warn!("Update failed: {}", error);
        }
    }

    // Step 3: fix grid containers after saving
    let grid = processor.process_after_saving(&context, &outcome.payload);

    let records = table_names
        .into_iter()
        .map(|table| {
            let rows = store.records(&table);
            (table, rows)
        })
        .collect();

    let output = PreviewOutput {
        payload: outcome.payload.to_raw(),
        commands: outcome.commands,
        data: plan.data,
        remap: outcome.report,
        grid,
        records,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
