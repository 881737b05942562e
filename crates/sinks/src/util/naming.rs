//! Output unit naming
//!
//! Every output unit encodes its metadata in its name, so rollover
//! recovery and pruning never have to open a file:
//!
//! ```text
//! unbatched file:   <nonce>-<generation:019>-<table>-<yyyyMMddHHmmss>.<ext>
//! batch directory:  <nonce>-<yyyyMMddHHmmss>/
//!   batch file:     <generation:019>-<table>.<ext>
//! ```
//!
//! While open, a unit carries the `active-` prefix. A unit that could not
//! be closed cleanly ends up with the `dirty-` prefix instead of its final
//! name.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Prefix of a unit that is still being written
pub const ACTIVE_PREFIX: &str = "active-";

/// Prefix of a unit that was not closed cleanly
pub const DIRTY_PREFIX: &str = "dirty-";

/// Timestamp layout embedded in unit names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const TIMESTAMP_LEN: usize = 14;
const GENERATION_LEN: usize = 19;

/// Lifecycle state encoded in a unit's name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Active,
    Dirty,
    Final,
}

impl UnitState {
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Active => ACTIVE_PREFIX,
            Self::Dirty => DIRTY_PREFIX,
            Self::Final => "",
        }
    }

    /// Split a name into its state and the unprefixed remainder
    pub fn split(name: &str) -> (Self, &str) {
        if let Some(rest) = name.strip_prefix(ACTIVE_PREFIX) {
            (Self::Active, rest)
        } else if let Some(rest) = name.strip_prefix(DIRTY_PREFIX) {
            (Self::Dirty, rest)
        } else {
            (Self::Final, name)
        }
    }
}

/// Format a unit timestamp (second precision, UTC)
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a unit timestamp
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != TIMESTAMP_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_generation(s: &str) -> Option<i64> {
    if s.len() != GENERATION_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Name of an unbatched output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUnitName {
    pub nonce: String,
    pub generation: i64,
    pub table: String,
    pub timestamp: DateTime<Utc>,
    pub extension: String,
}

impl FileUnitName {
    /// File name in the given state
    pub fn file_name(&self, state: UnitState) -> String {
        format!(
            "{}{}-{:019}-{}-{}.{}",
            state.prefix(),
            self.nonce,
            self.generation,
            self.table,
            format_timestamp(self.timestamp),
            self.extension
        )
    }

    /// Parse a file name; `None` if it does not follow the grammar
    pub fn parse(name: &str) -> Option<(UnitState, Self)> {
        let (state, rest) = UnitState::split(name);
        let (stem, extension) = rest.rsplit_once('.')?;
        let (nonce, rest) = stem.split_once('-')?;
        let (generation, rest) = rest.split_once('-')?;
        let (table, timestamp) = rest.rsplit_once('-')?;

        if nonce.is_empty() || table.is_empty() || extension.is_empty() {
            return None;
        }

        Some((
            state,
            Self {
                nonce: nonce.to_string(),
                generation: parse_generation(generation)?,
                table: table.to_string(),
                timestamp: parse_timestamp(timestamp)?,
                extension: extension.to_string(),
            },
        ))
    }
}

/// Name of a batch directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDirName {
    pub nonce: String,
    pub timestamp: DateTime<Utc>,
}

impl BatchDirName {
    pub fn dir_name(&self, state: UnitState) -> String {
        format!(
            "{}{}-{}",
            state.prefix(),
            self.nonce,
            format_timestamp(self.timestamp)
        )
    }

    pub fn parse(name: &str) -> Option<(UnitState, Self)> {
        let (state, rest) = UnitState::split(name);
        let (nonce, timestamp) = rest.rsplit_once('-')?;
        if nonce.is_empty() || nonce.contains('-') {
            return None;
        }
        Some((
            state,
            Self {
                nonce: nonce.to_string(),
                timestamp: parse_timestamp(timestamp)?,
            },
        ))
    }
}

/// Name of a data file inside a batch directory
pub fn batch_file_name(generation: i64, table: &str, extension: &str) -> String {
    format!("{:019}-{}.{}", generation, table, extension)
}

/// Parse a batch data file name into (generation, table)
pub fn parse_batch_file_name(name: &str) -> Option<(i64, String)> {
    let (stem, extension) = name.rsplit_once('.')?;
    let (generation, table) = stem.split_once('-')?;
    if table.is_empty() || extension.is_empty() {
        return None;
    }
    Some((parse_generation(generation)?, table.to_string()))
}

/// Name of the JSON schema written next to a table's data
pub fn schema_file_name(table: &str, generation: i64) -> String {
    format!("{}-{}-schema.json", table, generation)
}

/// Table owning a schema file name, if `name` is one
pub fn schema_file_table(name: &str) -> Option<&str> {
    let stem = name.strip_suffix("-schema.json")?;
    let (table, generation) = stem.rsplit_once('-')?;
    generation.parse::<i64>().ok()?;
    Some(table)
}

/// Parse a schema file name into (table, generation)
pub fn parse_schema_file_name(name: &str) -> Option<(String, i64)> {
    let stem = name.strip_suffix("-schema.json")?;
    let (table, generation) = stem.rsplit_once('-')?;
    if table.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((table.to_string(), generation.parse().ok()?))
}

#[cfg(test)]
#[path = "naming_test.rs"]
mod naming_test;
