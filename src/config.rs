use anyhow::{bail, Context, Result};

/// Table and field names of the host record model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Table of reference records (pointers from a parent record to an attachment).
    pub reference_table: String,
    /// Reference field naming the parent table.
    pub reference_parent_table_field: String,
    /// Reference field holding the parent id.
    pub reference_parent_id_field: String,
    /// Reference field naming the parent's relation field.
    pub reference_parent_field_field: String,

    /// Table of content elements.
    pub content_table: String,
    /// Content element field pointing at its grid container.
    pub container_field: String,
    /// Language column of localizable records.
    pub language_field: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            reference_table: "sys_file_reference".to_string(),
            reference_parent_table_field: "tablenames".to_string(),
            reference_parent_id_field: "uid_foreign".to_string(),
            reference_parent_field_field: "fieldname".to_string(),
            content_table: "tt_content".to_string(),
            container_field: "tx_gridelements_container".to_string(),
            language_field: "sys_language_uid".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Records copied by the engine are not hidden.
    pub auto_unhide: bool,
    /// Create missing localizations (and their parents) during the remap pass.
    pub pretranslate_missing_references: bool,
    /// Import empty translated values instead of skipping them.
    pub force_create_empty: bool,

    /// Extension whose presence enables container synchronization.
    pub grid_extension: String,

    pub tables: TableNames,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_unhide: false,
            pretranslate_missing_references: true,
            force_create_empty: false,
            grid_extension: "gridelements".to_string(),
            tables: TableNames::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let tables = defaults.tables;

        Ok(Self {
            // Flags
            auto_unhide: env_flag("L10N_AUTO_UNHIDE", defaults.auto_unhide)?,
            pretranslate_missing_references: env_flag(
                "L10N_PRETRANSLATE_REFERENCES",
                defaults.pretranslate_missing_references,
            )?,
            force_create_empty: env_flag("L10N_FORCE_CREATE_EMPTY", defaults.force_create_empty)?,

            // Optional integrations
            grid_extension: env_or("L10N_GRID_EXTENSION", defaults.grid_extension),

            // Record model
            tables: TableNames {
                reference_table: env_or("L10N_REFERENCE_TABLE", tables.reference_table),
                reference_parent_table_field: env_or(
                    "L10N_REFERENCE_PARENT_TABLE_FIELD",
                    tables.reference_parent_table_field,
                ),
                reference_parent_id_field: env_or(
                    "L10N_REFERENCE_PARENT_ID_FIELD",
                    tables.reference_parent_id_field,
                ),
                reference_parent_field_field: env_or(
                    "L10N_REFERENCE_PARENT_FIELD_FIELD",
                    tables.reference_parent_field_field,
                ),
                content_table: env_or("L10N_CONTENT_TABLE", tables.content_table),
                container_field: env_or("L10N_CONTAINER_FIELD", tables.container_field),
                language_field: env_or("L10N_LANGUAGE_FIELD", tables.language_field),
            },
        })
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(raw) => parse_flag(&raw).with_context(|| format!("{} is not a valid flag", name)),
        Err(_) => Ok(default),
    }
}

/// Accepts the spellings the host configuration uses for booleans.
fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}
