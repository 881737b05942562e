//! Output rotation
//!
//! `RotatingOutput` owns the active output units of one file sink. Writes
//! arrive one complete block at a time, so a unit never holds half a block
//! unless truncating a failed write also failed; such a unit is closed as
//! `dirty-` right away.
//!
//! # Layout
//!
//! ```text
//! unbatched (one unit per table generation):
//!   export/
//!   ├── active-exp-0000000000000000007-ORDERS-20240309130000.csv   (open)
//!   ├── exp-0000000000000000007-ORDERS-20240309120000.csv          (rolled)
//!   └── ORDERS-7-schema.json
//!
//! batched (one unit for every table):
//!   export/
//!   ├── active-exp-20240309130000/
//!   │   ├── 0000000000000000007-ORDERS.csv
//!   │   └── ORDERS-7-schema.json
//!   └── exp-20240309120000/
//! ```
//!
//! A unit rolls once `period` has elapsed since it was opened. All state
//! sits behind one mutex shared by every partition's decoder; each write
//! holds it for the duration of one block. Pruning walks the directory
//! outside that mutex and only takes it to drop the schema sidecars of
//! generations left without units.
//!
//! Generations must not be negative: a sign does not fit the fixed-width
//! generation field of a unit name.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::naming::{
    ACTIVE_PREFIX, BatchDirName, DIRTY_PREFIX, FileUnitName, UnitState, batch_file_name,
    schema_file_name,
};
use super::prune::{PrunePolicy, prune_units, remove_orphan_schemas};
use crate::common::SinkMetrics;

/// Configuration for output rotation
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Directory holding every unit
    pub base_path: PathBuf,

    /// Leading component of every unit name
    pub nonce: String,

    /// Data file extension, without the dot
    pub extension: String,

    /// Lifetime of a unit before it rolls
    pub period: Duration,

    /// One directory per period instead of one file per table generation
    pub batched: bool,

    /// Prune by age after each roll
    pub retention: Option<Duration>,

    /// Prune by count after each roll (0 = unlimited)
    pub max_files_per_table: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("export"),
            nonce: "export".into(),
            extension: "csv".into(),
            period: Duration::from_secs(60 * 60),
            batched: false,
            retention: None,
            max_files_per_table: 0,
        }
    }
}

/// One block of formatted rows for a table generation
#[derive(Debug, Clone, Copy)]
pub struct BlockWrite<'a> {
    pub table: &'a str,
    pub generation: i64,
    /// Schema sidecar contents, written once per unit
    pub schema_json: &'a str,
    pub data: &'a [u8],
}

/// An open output unit
struct ActiveUnit {
    /// Path while open
    active: PathBuf,
    final_path: PathBuf,
    dirty_path: PathBuf,
    timestamp: DateTime<Utc>,
    opened: Instant,
    batch: bool,
    files: HashMap<PathBuf, File>,
    schemas: HashSet<String>,
    /// Holds bytes of a failed write
    dirty: bool,
}

impl ActiveUnit {
    fn file(config: &RotationConfig, table: &str, generation: i64, timestamp: DateTime<Utc>) -> Self {
        let name = FileUnitName {
            nonce: config.nonce.clone(),
            generation,
            table: table.to_string(),
            timestamp,
            extension: config.extension.clone(),
        };
        let path = |state| config.base_path.join(name.file_name(state));
        Self {
            active: path(UnitState::Active),
            final_path: path(UnitState::Final),
            dirty_path: path(UnitState::Dirty),
            timestamp,
            opened: Instant::now(),
            batch: false,
            files: HashMap::new(),
            schemas: HashSet::new(),
            dirty: false,
        }
    }

    fn batch(config: &RotationConfig, timestamp: DateTime<Utc>) -> io::Result<Self> {
        let name = BatchDirName {
            nonce: config.nonce.clone(),
            timestamp,
        };
        let path = |state| config.base_path.join(name.dir_name(state));
        let active = path(UnitState::Active);
        fs::create_dir_all(&active)?;
        Ok(Self {
            active,
            final_path: path(UnitState::Final),
            dirty_path: path(UnitState::Dirty),
            timestamp,
            opened: Instant::now(),
            batch: true,
            files: HashMap::new(),
            schemas: HashSet::new(),
            dirty: false,
        })
    }

    fn is_due(&self, period: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.opened) >= period
    }

    fn data_path(&self, table: &str, generation: i64, extension: &str) -> PathBuf {
        if self.batch {
            self.active.join(batch_file_name(generation, table, extension))
        } else {
            self.active.clone()
        }
    }

    /// Append `data`, truncating back to the previous length on failure
    fn append(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        let file = match self.files.entry(path.to_path_buf()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(
                OpenOptions::new().create(true).append(true).open(path)?,
            ),
        };

        let len = file.metadata()?.len();
        if let Err(e) = file.write_all(data).and_then(|()| file.flush()) {
            if let Err(truncate) = file.set_len(len) {
                warn!(
                    path = %path.display(),
                    error = %truncate,
                    "failed to truncate partial write"
                );
                self.dirty = true;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Close and rename to the final (or dirty) name
    ///
    /// Returns the new path, or `None` if the unit never received data.
    fn close(mut self, clean: bool) -> io::Result<Option<PathBuf>> {
        let mut clean = clean && !self.dirty;
        for (path, file) in self.files.drain() {
            if let Err(e) = file.sync_all() {
                warn!(path = %path.display(), error = %e, "failed to sync output file");
                clean = false;
            }
        }

        if self.batch {
            if fs::read_dir(&self.active)?.next().is_none() {
                fs::remove_dir(&self.active)?;
                return Ok(None);
            }
        } else if !self.active.exists() {
            return Ok(None);
        }

        let target = if clean {
            &self.final_path
        } else {
            &self.dirty_path
        };
        fs::rename(&self.active, target)?;
        Ok(Some(target.clone()))
    }
}

#[derive(Default)]
struct OutputState {
    /// Open batch (batched mode)
    batch: Option<ActiveUnit>,
    /// Open files by (table, generation) (unbatched mode)
    files: HashMap<(String, i64), ActiveUnit>,
    /// Latest unit timestamp per key, so names never repeat
    last_batch: Option<DateTime<Utc>>,
    last_file: HashMap<(String, i64), DateTime<Utc>>,
    /// Unbatched schema sidecars already written
    schemas: HashSet<(String, i64)>,
    closed: bool,
}

/// Rotating output shared by the decoders of one file sink
pub struct RotatingOutput {
    config: RotationConfig,
    state: Mutex<OutputState>,
    /// Held by the one prune pass allowed at a time
    pruning: Mutex<()>,
    metrics: Arc<SinkMetrics>,
}

impl RotatingOutput {
    /// Create the output directory and recover stranded units
    pub fn open(config: RotationConfig, metrics: Arc<SinkMetrics>) -> io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        let recovered = recover_stranded(&config.base_path)?;
        info!(
            path = %config.base_path.display(),
            nonce = %config.nonce,
            batched = config.batched,
            period = ?config.period,
            recovered = recovered.len(),
            "file output ready"
        );

        Ok(Self {
            config,
            state: Mutex::new(OutputState::default()),
            pruning: Mutex::new(()),
            metrics,
        })
    }

    #[inline]
    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Write one complete block
    ///
    /// On error nothing of the block remains in the unit, unless the unit
    /// was closed as dirty.
    pub fn write_block(&self, block: &BlockWrite<'_>) -> io::Result<()> {
        if block.generation < 0 {
            self.metrics.write_error();
            error!(
                table = block.table,
                generation = block.generation,
                "negative generation cannot be named"
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("negative generation {}", block.generation),
            ));
        }

        let rolled = {
            let mut state = self.state.lock();
            if state.closed {
                self.metrics.write_error();
                return Err(io::Error::other("file output is closed"));
            }
            self.roll_due(&mut state, Instant::now())
        };
        if rolled > 0 {
            self.prune();
        }

        let mut state = self.state.lock();
        if state.closed {
            self.metrics.write_error();
            return Err(io::Error::other("file output is closed"));
        }

        let key = (block.table.to_string(), block.generation);
        let result = if self.config.batched {
            self.write_batched(&mut state, block)
        } else {
            self.write_unbatched(&mut state, key.clone(), block)
        };

        if let Err(e) = &result {
            self.metrics.write_error();
            error!(
                table = block.table,
                generation = block.generation,
                error = %e,
                "failed to write block"
            );
            let dirty = if self.config.batched {
                state.batch.take_if(|unit| unit.dirty)
            } else if state.files.get(&key).is_some_and(|unit| unit.dirty) {
                state.files.remove(&key)
            } else {
                None
            };
            if let Some(unit) = dirty {
                self.close_unit(unit, false);
            }
        }
        result
    }

    fn write_batched(&self, state: &mut OutputState, block: &BlockWrite<'_>) -> io::Result<()> {
        if state.batch.is_none() {
            let timestamp = next_timestamp(state.last_batch);
            state.last_batch = Some(timestamp);
            let unit = ActiveUnit::batch(&self.config, timestamp)?;
            debug!(path = %unit.active.display(), "opened batch");
            state.batch = Some(unit);
        }
        let Some(unit) = state.batch.as_mut() else {
            return Err(io::Error::other("no active batch"));
        };

        let schema = schema_file_name(block.table, block.generation);
        if !unit.schemas.contains(&schema) {
            fs::write(unit.active.join(&schema), block.schema_json)?;
            unit.schemas.insert(schema);
        }

        let path = unit.data_path(block.table, block.generation, &self.config.extension);
        unit.append(&path, block.data)
    }

    fn write_unbatched(
        &self,
        state: &mut OutputState,
        key: (String, i64),
        block: &BlockWrite<'_>,
    ) -> io::Result<()> {
        if !state.schemas.contains(&key) {
            let path = self
                .config
                .base_path
                .join(schema_file_name(block.table, block.generation));
            fs::write(path, block.schema_json)?;
            state.schemas.insert(key.clone());
        }

        if !state.files.contains_key(&key) {
            let timestamp = next_timestamp(state.last_file.get(&key).copied());
            state.last_file.insert(key.clone(), timestamp);
            let unit = ActiveUnit::file(&self.config, block.table, block.generation, timestamp);
            debug!(path = %unit.active.display(), "opened output file");
            state.files.insert(key.clone(), unit);
        }
        let Some(unit) = state.files.get_mut(&key) else {
            return Err(io::Error::other("no active file"));
        };

        let path = unit.data_path(block.table, block.generation, &self.config.extension);
        unit.append(&path, block.data)
    }

    /// Roll every unit whose period has elapsed, then prune
    ///
    /// Returns the number of units rolled.
    pub fn roll_if_due(&self) -> usize {
        let mut state = self.state.lock();
        let rolled = self.roll_due(&mut state, Instant::now());
        drop(state);
        if rolled > 0 {
            self.prune();
        }
        rolled
    }

    fn roll_due(&self, state: &mut OutputState, now: Instant) -> usize {
        let period = self.config.period;
        let mut due = Vec::new();

        if let Some(unit) = state.batch.take_if(|unit| unit.is_due(period, now)) {
            due.push(unit);
        }
        let keys: Vec<(String, i64)> = state
            .files
            .iter()
            .filter(|(_, unit)| unit.is_due(period, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(unit) = state.files.remove(&key) {
                due.push(unit);
            }
        }

        let rolled = due.len();
        for unit in due {
            self.close_unit(unit, true);
        }
        rolled
    }

    /// Close the unbatched file of a retired table generation
    pub fn retire(&self, table: &str, generation: i64) {
        let mut state = self.state.lock();
        if let Some(unit) = state.files.remove(&(table.to_string(), generation)) {
            self.close_unit(unit, true);
        }
    }

    /// Close every unit; later writes fail
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;

        let mut units: Vec<ActiveUnit> = state.files.drain().map(|(_, unit)| unit).collect();
        units.extend(state.batch.take());
        for unit in units {
            self.close_unit(unit, true);
        }
        info!(path = %self.config.base_path.display(), "file output closed");
    }

    /// Number of open units
    pub fn active_units(&self) -> usize {
        let state = self.state.lock();
        state.files.len() + usize::from(state.batch.is_some())
    }

    fn close_unit(&self, unit: ActiveUnit, clean: bool) {
        let active = unit.active.clone();
        let timestamp = unit.timestamp;
        match unit.close(clean) {
            Ok(Some(path)) => {
                self.metrics.unit_rolled();
                info!(path = %path.display(), opened = %timestamp, "output unit closed");
            }
            Ok(None) => debug!(path = %active.display(), "empty output unit removed"),
            Err(e) => error!(path = %active.display(), error = %e, "failed to close output unit"),
        }
    }

    /// Apply the configured retention policies
    ///
    /// Skipped while another prune pass is running.
    fn prune(&self) {
        let Some(_pruning) = self.pruning.try_lock() else {
            return;
        };

        let mut policies = Vec::new();
        if let Some(retention) = self.config.retention {
            policies.push(PrunePolicy::ByAge { retention });
        }
        if self.config.max_files_per_table > 0 {
            policies.push(PrunePolicy::ByCount {
                max_files: self.config.max_files_per_table,
                table: None,
            });
        }

        let mut pruned = HashSet::new();
        for policy in policies {
            match prune_units(
                &self.config.base_path,
                Some(&self.config.nonce),
                &policy,
                Utc::now(),
            ) {
                Ok((report, generations)) => {
                    self.metrics.units_pruned(report.removed.len() as u64);
                    pruned.extend(generations);
                }
                Err(e) => warn!(
                    path = %self.config.base_path.display(),
                    error = %e,
                    "failed to prune output"
                ),
            }
        }
        if pruned.is_empty() {
            return;
        }

        // Under the state lock, so no unit of these generations opens meanwhile
        let mut state = self.state.lock();
        pruned.retain(|key| !state.files.contains_key(key));
        for key in &pruned {
            state.schemas.remove(key);
        }
        match remove_orphan_schemas(&self.config.base_path, &pruned) {
            Ok(removed) if !removed.is_empty() => {
                debug!(removed = removed.len(), "removed orphaned schema sidecars");
            }
            Ok(_) => {}
            Err(e) => warn!(
                path = %self.config.base_path.display(),
                error = %e,
                "failed to remove schema sidecars"
            ),
        }
    }
}

impl Drop for RotatingOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Unit timestamp for now, strictly after `previous`
fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    let now = now - TimeDelta::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
    match previous {
        Some(previous) if previous >= now => previous + TimeDelta::seconds(1),
        _ => now,
    }
}

/// Rename `active-` units left behind by an earlier run
///
/// Empty active batch directories are removed. A unit whose final name is
/// taken is renamed with the `dirty-` prefix. Returns the new paths.
pub fn recover_stranded(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut recovered = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(ACTIVE_PREFIX)) else {
            continue;
        };
        let path = entry.path();

        if entry.file_type()?.is_dir() && fs::read_dir(&path)?.next().is_none() {
            fs::remove_dir(&path)?;
            debug!(path = %path.display(), "removed empty stranded batch");
            continue;
        }

        let mut target = dir.join(rest);
        if target.exists() {
            target = dir.join(format!("{DIRTY_PREFIX}{rest}"));
        }
        fs::rename(&path, &target)?;
        warn!(
            from = %path.display(),
            to = %target.display(),
            "recovered stranded output unit"
        );
        recovered.push(target);
    }

    Ok(recovered)
}

#[cfg(test)]
#[path = "rotation_test.rs"]
mod rotation_test;
