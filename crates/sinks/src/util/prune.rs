//! Output pruning
//!
//! Two independent policies, both driven by unit names alone:
//!
//! - **by age**: remove units whose embedded timestamp is not newer than
//!   `now - retention`
//! - **by count**: keep the `max_files` most recent units of each table,
//!   optionally restricted to one table
//!
//! Active units are never touched. Once the last unbatched unit of a table
//! generation is gone, its `<table>-<generation>-schema.json` sidecar goes
//! with it.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use super::naming::{
    BatchDirName, FileUnitName, UnitState, parse_batch_file_name, parse_schema_file_name,
    schema_file_table,
};

/// Pruning policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrunePolicy {
    /// Remove units older than `retention`
    ByAge { retention: Duration },
    /// Keep the newest `max_files` units per table (0 keeps everything)
    ByCount {
        max_files: usize,
        table: Option<String>,
    },
}

/// What an output unit holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    /// Unbatched file holding one table generation
    File { table: String, generation: i64 },
    /// Batch directory and the tables it holds
    Batch { tables: Vec<String> },
}

/// An output unit found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
    pub path: PathBuf,
    pub state: UnitState,
    pub timestamp: DateTime<Utc>,
    pub kind: UnitKind,
}

/// Result of a prune pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Removed files and directories
    pub removed: Vec<PathBuf>,
    /// Units left in place
    pub kept: usize,
    /// Schema sidecars removed along with the last unit of their generation
    pub schemas: Vec<PathBuf>,
}

/// List finished (final or dirty) units in `dir`
///
/// Entries whose names do not follow the unit grammar are ignored, as are
/// units of other nonces when `nonce` is given.
pub fn scan_units(dir: &Path, nonce: Option<&str>) -> io::Result<Vec<OutputUnit>> {
    let mut units = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            let Some((state, batch)) = BatchDirName::parse(name) else {
                continue;
            };
            if state == UnitState::Active || nonce.is_some_and(|n| n != batch.nonce) {
                continue;
            }
            let mut tables: Vec<String> = fs::read_dir(&path)?
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().and_then(parse_batch_file_name))
                .map(|(_, table)| table)
                .collect();
            tables.sort();
            tables.dedup();
            units.push(OutputUnit {
                path,
                state,
                timestamp: batch.timestamp,
                kind: UnitKind::Batch { tables },
            });
        } else {
            let Some((state, file)) = FileUnitName::parse(name) else {
                continue;
            };
            if state == UnitState::Active || nonce.is_some_and(|n| n != file.nonce) {
                continue;
            }
            units.push(OutputUnit {
                path,
                state,
                timestamp: file.timestamp,
                kind: UnitKind::File {
                    table: file.table,
                    generation: file.generation,
                },
            });
        }
    }

    units.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
    Ok(units)
}

/// Apply `policy` to the units in `dir`, then drop orphaned schema sidecars
pub fn prune(
    dir: &Path,
    nonce: Option<&str>,
    policy: &PrunePolicy,
    now: DateTime<Utc>,
) -> io::Result<PruneReport> {
    let (mut report, pruned) = prune_units(dir, nonce, policy, now)?;
    report.schemas = remove_orphan_schemas(dir, &pruned)?;
    Ok(report)
}

/// Apply `policy` to the units in `dir`
///
/// Also returns the table generations that lost an unbatched unit.
pub(crate) fn prune_units(
    dir: &Path,
    nonce: Option<&str>,
    policy: &PrunePolicy,
    now: DateTime<Utc>,
) -> io::Result<(PruneReport, HashSet<(String, i64)>)> {
    let units = scan_units(dir, nonce)?;
    let generations: HashMap<PathBuf, (String, i64)> = units
        .iter()
        .filter_map(|unit| match &unit.kind {
            UnitKind::File { table, generation } => {
                Some((unit.path.clone(), (table.clone(), *generation)))
            }
            UnitKind::Batch { .. } => None,
        })
        .collect();

    let report = match policy {
        PrunePolicy::ByAge { retention } => prune_by_age(units, *retention, now)?,
        PrunePolicy::ByCount { max_files, table } => {
            prune_by_count(units, *max_files, table.as_deref())?
        }
    };

    if !report.removed.is_empty() {
        info!(
            path = %dir.display(),
            removed = report.removed.len(),
            kept = report.kept,
            "pruned export output"
        );
    }

    let pruned = report
        .removed
        .iter()
        .filter_map(|path| generations.get(path).cloned())
        .collect();
    Ok((report, pruned))
}

/// Remove the sidecars of `candidates` that no unbatched unit refers to
///
/// Units of every nonce and state count, active ones included. Returns the
/// removed paths.
pub fn remove_orphan_schemas(
    dir: &Path,
    candidates: &HashSet<(String, i64)>,
) -> io::Result<Vec<PathBuf>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut live = HashSet::new();
    let mut sidecars = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(key) = parse_schema_file_name(name) {
            if candidates.contains(&key) {
                sidecars.push((key, entry.path()));
            }
        } else if let Some((_, file)) = FileUnitName::parse(name) {
            live.insert((file.table, file.generation));
        }
    }

    let mut removed = Vec::new();
    for (key, path) in sidecars {
        if live.contains(&key) {
            continue;
        }
        debug!(path = %path.display(), table = %key.0, generation = key.1, "removing schema sidecar");
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

fn prune_by_age(
    units: Vec<OutputUnit>,
    retention: Duration,
    now: DateTime<Utc>,
) -> io::Result<PruneReport> {
    let cutoff = TimeDelta::from_std(retention)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta));
    let mut report = PruneReport::default();

    for unit in units {
        match cutoff {
            Some(cutoff) if unit.timestamp <= cutoff => {
                remove_unit(&unit)?;
                report.removed.push(unit.path);
            }
            _ => report.kept += 1,
        }
    }
    Ok(report)
}

fn prune_by_count(
    units: Vec<OutputUnit>,
    max_files: usize,
    only_table: Option<&str>,
) -> io::Result<PruneReport> {
    let mut report = PruneReport::default();
    if max_files == 0 {
        report.kept = units.len();
        return Ok(report);
    }

    // Newest first, per table
    let mut files: HashMap<String, Vec<&OutputUnit>> = HashMap::new();
    let mut batches: HashMap<String, Vec<&OutputUnit>> = HashMap::new();
    for unit in units.iter().rev() {
        match &unit.kind {
            UnitKind::File { table, .. } => files.entry(table.clone()).or_default().push(unit),
            UnitKind::Batch { tables } => {
                for table in tables {
                    batches.entry(table.clone()).or_default().push(unit);
                }
            }
        }
    }

    let selected = |table: &str| only_table.is_none_or(|only| only == table);

    for (table, units) in &files {
        if !selected(table) {
            continue;
        }
        for unit in units.iter().skip(max_files) {
            remove_unit(unit)?;
            report.removed.push(unit.path.clone());
        }
    }

    for (table, units) in &batches {
        if !selected(table) {
            continue;
        }
        for unit in units.iter().skip(max_files) {
            report.removed.extend(remove_table_from_batch(&unit.path, table)?);
        }
    }

    report.kept = units
        .iter()
        .filter(|unit| unit.path.exists())
        .count();
    Ok(report)
}

fn remove_unit(unit: &OutputUnit) -> io::Result<()> {
    debug!(path = %unit.path.display(), timestamp = %unit.timestamp, "removing output unit");
    match unit.kind {
        UnitKind::File { .. } => fs::remove_file(&unit.path),
        UnitKind::Batch { .. } => fs::remove_dir_all(&unit.path),
    }
}

/// Remove one table's data and schema files from a batch directory
///
/// The directory itself goes once nothing is left in it.
fn remove_table_from_batch(dir: &Path, table: &str) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let owner = parse_batch_file_name(name)
            .map(|(_, t)| t)
            .or_else(|| schema_file_table(name).map(str::to_string));
        if owner.as_deref() == Some(table) {
            fs::remove_file(entry.path())?;
            removed.push(entry.path());
        }
    }

    if fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
        removed.push(dir.to_path_buf());
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "prune_test.rs"]
mod prune_test;
