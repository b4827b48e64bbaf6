//! `vulnbase partition` — deterministic partitioning of CVE-keyed datasets.
//!
//! `split` shards a snapshot into per-year thousand-bucket files; `sync`
//! reconciles a partitioned snapshot tree into the partitioned base
//! directory, one file at a time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Subcommand;

use vulnbase_recon::partition::{partition_key, PartitionId};
use vulnbase_recon::report::ChangeKind;
use vulnbase_recon::{reconcile, RecordSet, SourceConfig};

use crate::exit_codes::{EXIT_DESTINATION, EXIT_IDENTITY, EXIT_INVALID_CONFIG, EXIT_PARSE};
use crate::CliError;

fn partition_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

#[derive(Subcommand)]
pub enum PartitionCommands {
    /// Split a snapshot CSV into per-year thousand-bucket partition files
    #[command(after_help = "\
Examples:
  vulnbase partition split CVE-2026.csv partitioned/2026-08-05
  vulnbase partition split feed.csv out --identity-field cveID")]
    Split {
        /// Snapshot CSV to shard
        input: PathBuf,

        /// Directory the partition tree is written under
        out_dir: PathBuf,

        /// Column holding the CVE-shaped identity value
        #[arg(long, default_value = "id")]
        identity_field: String,
    },

    /// Reconcile a partitioned snapshot tree into the base directory
    #[command(after_help = "\
Examples:
  vulnbase partition sync nvd.toml partitioned/2026-08-05")]
    Sync {
        /// Source config with a [partition] section
        config: PathBuf,

        /// Root of the freshly partitioned snapshot
        snapshot_dir: PathBuf,
    },
}

pub fn cmd_partition(command: PartitionCommands) -> Result<(), CliError> {
    match command {
        PartitionCommands::Split { input, out_dir, identity_field } => {
            cmd_split(input, out_dir, identity_field)
        }
        PartitionCommands::Sync { config, snapshot_dir } => cmd_sync(config, snapshot_dir),
    }
}

// ── Split ───────────────────────────────────────────────────────────

fn cmd_split(input: PathBuf, out_dir: PathBuf, identity_field: String) -> Result<(), CliError> {
    let set = vulnbase_io::csv::read_record_set(&input)
        .map_err(|e| partition_err(EXIT_PARSE, e.to_string()))?;

    let mut groups: BTreeMap<PartitionId, RecordSet> = BTreeMap::new();
    for record in &set.records {
        let bucket = partition_key(record.get(&identity_field).unwrap_or(""));
        groups
            .entry(bucket)
            .or_insert_with(|| RecordSet::new(set.header.clone()))
            .push(record.clone());
    }

    let buckets = groups.len();
    for (bucket, rows) in &groups {
        let dest = out_dir.join(bucket.relative_dir()).join(bucket.file_name());
        vulnbase_io::replace_atomic(rows, &dest)
            .map_err(|e| partition_err(EXIT_DESTINATION, e.to_string()))?;
        eprintln!("partitioned {} rows → {}", rows.len(), dest.display());
    }

    eprintln!("split {} rows into {} partition(s)", set.len(), buckets);
    Ok(())
}

// ── Sync ────────────────────────────────────────────────────────────

fn cmd_sync(config_path: PathBuf, snapshot_dir: PathBuf) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| partition_err(EXIT_PARSE, format!("cannot read config: {e}")))?;
    let config = SourceConfig::from_toml(&config_str)
        .map_err(|e| partition_err(EXIT_INVALID_CONFIG, e.to_string()))?;
    let Some(ref partition) = config.partition else {
        return Err(partition_err(
            EXIT_INVALID_CONFIG,
            "config has no [partition] section",
        ));
    };

    let base_root = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&partition.base_dir);

    let mut files = Vec::new();
    collect_csv_files(&snapshot_dir, &mut files).map_err(|e| {
        partition_err(EXIT_PARSE, format!("cannot walk {}: {e}", snapshot_dir.display()))
    })?;
    files.sort();

    for file in &files {
        let Ok(rel) = file.strip_prefix(&snapshot_dir) else { continue };
        let base_file = base_root.join(rel);

        let incoming = vulnbase_io::csv::read_record_set(file)
            .map_err(|e| partition_err(EXIT_PARSE, e.to_string()))?;
        let baseline = if base_file.exists() {
            vulnbase_io::csv::read_record_set(&base_file)
                .map_err(|e| partition_err(EXIT_PARSE, e.to_string()))?
        } else {
            RecordSet::empty()
        };

        let outcome = reconcile(&config, &baseline, &incoming).map_err(|e| {
            partition_err(EXIT_IDENTITY, format!("{}: {e}", file.display()))
        })?;
        vulnbase_io::replace_atomic(&outcome.merged, &base_file)
            .map_err(|e| partition_err(EXIT_DESTINATION, e.to_string()))?;

        let summary = outcome.report.summary();
        if summary.added > 0 || summary.updated > 0 {
            eprintln!(
                "{}: {} new, {} modified",
                base_file.display(),
                summary.added,
                summary.updated,
            );
            let added = outcome.report.keys_with(ChangeKind::Added);
            if !added.is_empty() {
                eprintln!("  new: {}", added.join(", "));
            }
            let updated = outcome.report.keys_with(ChangeKind::Updated);
            if !updated.is_empty() {
                eprintln!("  modified: {}", updated.join(", "));
            }
        } else {
            eprintln!("{}: no changes", base_file.display());
        }
    }

    eprintln!("synchronized {} partition(s)", files.len());
    Ok(())
}

fn collect_csv_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_csv_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv")) {
            out.push(path);
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
