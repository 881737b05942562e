//! Shared building blocks for the sink adapters
//!
//! - **naming**: the unit name grammar (`active-`, `dirty-`, timestamps)
//! - **rotation**: active units, rollover and startup recovery
//! - **prune**: retention by age or by count
//! - **delimited**: CSV / TSV row rendering
//! - **schema_file**: JSON schema sidecars
//!
//! ```text
//! [ExportRow] → [RowFormatter] → block buffer ─(completion)─▶ [RotatingOutput]
//!                                                                │ roll
//!                                                                ▼
//!                                                            [prune]
//! ```

pub mod delimited;
pub mod naming;
pub mod prune;
pub mod rotation;
pub mod schema_file;

pub use delimited::{NULL_TEXT, RowFormatter, render_value};
pub use naming::{
    ACTIVE_PREFIX, BatchDirName, DIRTY_PREFIX, FileUnitName, UnitState, batch_file_name,
    schema_file_name,
};
pub use prune::{
    OutputUnit, PrunePolicy, PruneReport, UnitKind, prune, remove_orphan_schemas, scan_units,
};
pub use rotation::{BlockWrite, RotatingOutput, RotationConfig, recover_stranded};
pub use schema_file::render_schema;
