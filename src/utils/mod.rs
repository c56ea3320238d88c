use once_cell::sync::Lazy;
use regex::Regex;

/// Table holding the version stamp and other key/value metadata
pub const METAINFO_TABLE: &str = "metainfo";

/// Key of the version stamp row in the metainfo table
pub const VERSION_KEY: &str = "version";

/// Table holding named id sequences
pub const SEQUENCE_TABLE: &str = "id_sequences";

/// Table holding the single-writer advisory lock
pub const LOCK_TABLE: &str = "upgrade_lock";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

/// Check that a table, column, index or constraint name is safe to splice
/// into generated SQL.
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= 128 && IDENTIFIER.is_match(name)
}

/// Quote a string literal for SQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Get current timestamp in ISO 8601 format
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
