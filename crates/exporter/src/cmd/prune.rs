//! Prune command - apply retention to an output directory
//!
//! Works offline on any directory written by the file sink. Units still
//! carrying the `active-` prefix are never touched.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;

use export_sinks::{PrunePolicy, PruneReport, prune};

/// Prune command arguments
#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Output directory to prune
    #[arg(short, long)]
    pub path: PathBuf,

    /// Delete units older than this (e.g. 30m, 7d)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub retention: Option<Duration>,

    /// Keep at most this many units per table
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Only count-prune this table
    #[arg(long, requires = "max_files")]
    pub table: Option<String>,

    /// Only touch units written with this nonce
    #[arg(long)]
    pub nonce: Option<String>,
}

impl PruneArgs {
    /// Policies requested on the command line, age first
    fn policies(&self) -> Vec<PrunePolicy> {
        let mut policies = Vec::new();
        if let Some(retention) = self.retention {
            policies.push(PrunePolicy::ByAge { retention });
        }
        if let Some(max_files) = self.max_files {
            policies.push(PrunePolicy::ByCount {
                max_files,
                table: self.table.clone(),
            });
        }
        policies
    }
}

/// Run the prune command
pub fn run(args: PruneArgs) -> Result<()> {
    let policies = args.policies();
    if policies.is_empty() {
        bail!("nothing to prune: pass --retention and/or --max-files");
    }
    if !args.path.is_dir() {
        bail!("not a directory: {}", args.path.display());
    }

    let mut total = PruneReport::default();
    for policy in &policies {
        let report = prune(&args.path, args.nonce.as_deref(), policy, Utc::now())
            .with_context(|| format!("failed to prune {}", args.path.display()))?;
        total.kept = report.kept;
        total.removed.extend(report.removed);
        total.schemas.extend(report.schemas);
    }

    for path in total.removed.iter().chain(&total.schemas) {
        println!("removed {}", path.display());
    }
    println!(
        "{} removed, {} schema files removed, {} units kept in {}",
        total.removed.len(),
        total.schemas.len(),
        total.kept,
        args.path.display()
    );
    Ok(())
}
