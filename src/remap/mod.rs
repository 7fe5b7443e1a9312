//! Identifier remapping for imported translations.
//!
//! Translation files are authored against the record ids known at export
//! time. By the time they come back, localizations may have been created,
//! deleted or never existed. This module rewrites each entry so it addresses
//! the localized record that exists now, or a `NEW` placeholder for one that
//! still has to be created.
//!
//! # Architecture
//!
//! - `key`: field key codec (`table:locator:field[:path]`)
//! - `cache`: memoized localization and reference lookups
//! - `pass`: the remap pass and its single command run
//! - `reconcile`: moves pending placeholders to the ids the command run created
//!
//! # Example
//!
//! ```rust,ignore
//! use l10n_remap::remap::{RemapOptions, Remapper};
//!
//! let mut remapper = Remapper::new(&store, &executor, &audit, RemapOptions::new(2));
//! let outcome = remapper.remap(payload);
//! for pending in outcome.payload.placeholders() {
//!     println!("still unresolved: {}", pending.key);
//! }
//! ```

mod cache;
mod key;
mod pass;
mod reconcile;

pub use cache::{CacheStats, LocalizedIdCache, ReferenceCache, ReferenceRecord};
pub use key::{
    FieldKey, LanguageId, Locator, RecordId, KEY_DELIMITER, LOCATOR_DELIMITER, NEW_MARKER,
};
pub use pass::{RemapOptions, RemapOutcome, RemapReport, Remapper};
pub use reconcile::{reconcile, Marker, MarkerSet};
