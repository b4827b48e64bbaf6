//! `vulnbase combine` — merge a directory of per-source CSVs into one.
//!
//! Rows are deduplicated on the identity column, first file (in name order)
//! wins: the same dedup-append reconciliation, folded across inputs.

use std::path::PathBuf;

use vulnbase_recon::{reconcile, MergeMode, RecordSet, SourceConfig};

use crate::exit_codes::{EXIT_DESTINATION, EXIT_IDENTITY, EXIT_PARSE};
use crate::CliError;

fn combine_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

pub fn cmd_combine(dir: PathBuf, out: PathBuf, identity_field: String) -> Result<(), CliError> {
    let entries = std::fs::read_dir(&dir)
        .map_err(|e| combine_err(EXIT_PARSE, format!("cannot read {}: {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv")))
        // Don't fold a previous combine output back into itself.
        .filter(|path| path.file_name() != out.file_name() || path.parent() != out.parent())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(CliError::usage(format!("no CSV files in {}", dir.display())));
    }

    let config = SourceConfig {
        name: "combine".into(),
        destination: out.display().to_string(),
        identity_field,
        freshness_field: None,
        mode: MergeMode::DedupAppend,
        url: None,
        partition: None,
        batch: None,
    };

    let mut merged = RecordSet::empty();
    let mut skipped = 0;
    for file in &files {
        let incoming = vulnbase_io::csv::read_record_set(file)
            .map_err(|e| combine_err(EXIT_PARSE, e.to_string()))?;
        let outcome = reconcile(&config, &merged, &incoming)
            .map_err(|e| combine_err(EXIT_IDENTITY, format!("{}: {e}", file.display())))?;
        skipped += outcome.report.skipped_malformed;
        merged = outcome.merged;
    }

    vulnbase_io::replace_atomic(&merged, &out)
        .map_err(|e| combine_err(EXIT_DESTINATION, e.to_string()))?;

    eprintln!(
        "combined {} file(s) → {} ({} rows, {} malformed skipped)",
        files.len(),
        out.display(),
        merged.len(),
        skipped,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn first_file_wins_on_duplicate_keys() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "id,src\nCVE-1,alpha\nCVE-2,alpha\n").unwrap();
        fs::write(dir.path().join("b.csv"), "id,src\nCVE-2,beta\nCVE-3,beta\n").unwrap();
        let out = dir.path().join("combined.csv");

        cmd_combine(dir.path().to_path_buf(), out.clone(), "id".into()).unwrap();

        let content = fs::read_to_string(&out).unwrap();
        assert_eq!(content, "id,src\nCVE-1,alpha\nCVE-2,alpha\nCVE-3,beta\n");
    }

    #[test]
    fn output_inside_input_dir_is_not_refolded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "id\nCVE-1\n").unwrap();
        let out = dir.path().join("combined.csv");
        fs::write(&out, "id\nSTALE\n").unwrap();

        cmd_combine(dir.path().to_path_buf(), out.clone(), "id".into()).unwrap();

        let content = fs::read_to_string(&out).unwrap();
        assert_eq!(content, "id\nCVE-1\n");
    }

    #[test]
    fn empty_directory_is_a_usage_error() {
        let dir = tempdir().unwrap();
        let err = cmd_combine(
            dir.path().to_path_buf(),
            dir.path().join("combined.csv"),
            "id".into(),
        )
        .unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
    }
}
