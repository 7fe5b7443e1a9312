//! Identifier remapping for imported translations.
//!
//! An exported translation addresses every field by the id of the
//! original-language record. Before the host commits it, the payload is
//! rewritten to address the localized records instead, creating missing
//! localizations on the way ([`remap`]). After the commit, localized grid
//! children are moved into their localized containers ([`grid`]).
//! [`processor::TranslationProcessor`] wires both into the host's save hooks.

pub mod audit;
pub mod config;
pub mod error;
pub mod grid;
pub mod import;
pub mod memory;
pub mod payload;
pub mod processor;
pub mod remap;
pub mod store;

pub use config::{Config, TableNames};
pub use error::RemapError;
pub use payload::{RawPayload, TranslatedField, TranslationPayload};
pub use processor::{ImportContext, TranslationProcessor};
