use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use vulnbase_recon::model::{canonical_field, RecordSet};

use crate::error::IoError;

// ---------------------------------------------------------------------------
// Atomic replace
// ---------------------------------------------------------------------------

/// Atomically replace `dest` with the serialized record set.
///
/// The contents are fully written and fsynced to `<dest>.part`, then renamed
/// over the destination, so a concurrent reader never observes a
/// half-written file and any failure leaves the prior baseline untouched.
pub fn replace_atomic(set: &RecordSet, dest: &Path) -> Result<(), IoError> {
    let unwritable = |detail: String| IoError::DestinationUnwritable {
        path: dest.display().to_string(),
        detail,
    };

    let content = crate::csv::to_csv_string(set).map_err(&unwritable)?;

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| unwritable(e.to_string()))?;
        }
    }

    let part = part_path(dest);
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&part)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&part, dest)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&part);
        return Err(unwritable(e.to_string()));
    }
    Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Resume checkpoint
// ---------------------------------------------------------------------------

/// Identity keys already durably present in a destination file.
#[derive(Debug, Default)]
pub struct CheckpointState {
    pub keys: HashSet<String>,
    /// The file ended mid-record; the trailing fragment was skipped.
    pub truncated_tail: bool,
}

/// Rebuild resume state by re-reading the destination's identity column.
///
/// A missing destination reads as an empty state (first run). A trailing
/// fragment left by a crash mid-append is skipped, never fatal;
/// [`AppendWriter::open`] truncates it away before new writes start.
pub fn load_checkpoint(dest: &Path, identity_field: &str) -> Result<CheckpointState, IoError> {
    if !dest.exists() {
        return Ok(CheckpointState::default());
    }
    let content = crate::csv::read_file_as_utf8(dest)?;
    checkpoint_from_content(&content, identity_field).map_err(|detail| IoError::Parse {
        path: dest.display().to_string(),
        detail,
    })
}

fn checkpoint_from_content(
    content: &str,
    identity_field: &str,
) -> Result<CheckpointState, String> {
    let truncated_tail = !content.is_empty() && !content.ends_with('\n');
    let complete = if truncated_tail {
        match content.rfind('\n') {
            Some(i) => &content[..=i],
            None => "",
        }
    } else {
        content
    };

    let mut state = CheckpointState { keys: HashSet::new(), truncated_tail };
    if complete.trim().is_empty() {
        return Ok(state);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(complete.as_bytes());

    let wanted = canonical_field(identity_field);
    let id_index = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .position(|h| canonical_field(h) == wanted)
        .ok_or_else(|| format!("identity field '{identity_field}' not found in header"))?;

    for result in reader.records() {
        let row = result.map_err(|e| e.to_string())?;
        if let Some(key) = row.get(id_index) {
            let key = key.trim();
            if !key.is_empty() {
                state.keys.insert(key.to_string());
            }
        }
    }
    Ok(state)
}

// ---------------------------------------------------------------------------
// Append mode
// ---------------------------------------------------------------------------

/// Record-granularity durable appender.
///
/// Trades the whole-file atomicity of [`replace_atomic`] for crash-resume at
/// record granularity: every appended record is flushed and fsynced before
/// `append` returns. Intended for sources that take hours to re-scrape,
/// where losing a run's progress costs more than a momentarily growing file.
pub struct AppendWriter {
    file: File,
    path: PathBuf,
    written: u64,
    recovered_tail: bool,
}

impl AppendWriter {
    /// Open `dest` for appending, writing `header` first if the file is new
    /// or empty. A partial trailing line from a prior crash is truncated
    /// away so resumed writes start on a record boundary.
    pub fn open(dest: &Path, header: &[String]) -> Result<Self, IoError> {
        let unwritable = |detail: String| IoError::DestinationUnwritable {
            path: dest.display().to_string(),
            detail,
        };

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| unwritable(e.to_string()))?;
            }
        }

        let mut recovered_tail = false;
        let mut needs_header = true;
        if dest.exists() {
            let bytes = fs::read(dest).map_err(|e| unwritable(e.to_string()))?;
            if !bytes.is_empty() {
                needs_header = false;
                if !bytes.ends_with(b"\n") {
                    let keep = bytes
                        .iter()
                        .rposition(|&b| b == b'\n')
                        .map(|i| i + 1)
                        .unwrap_or(0);
                    let file = OpenOptions::new()
                        .write(true)
                        .open(dest)
                        .map_err(|e| unwritable(e.to_string()))?;
                    file.set_len(keep as u64).map_err(|e| unwritable(e.to_string()))?;
                    file.sync_all().map_err(|e| unwritable(e.to_string()))?;
                    recovered_tail = true;
                    if keep == 0 {
                        needs_header = true;
                    }
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dest)
            .map_err(|e| unwritable(e.to_string()))?;

        let mut writer = Self {
            file,
            path: dest.to_path_buf(),
            written: 0,
            recovered_tail,
        };
        if needs_header {
            let names: Vec<&str> = header.iter().map(String::as_str).collect();
            writer.write_line(&names)?;
        }
        Ok(writer)
    }

    /// Append one record and fsync it before returning.
    pub fn append(&mut self, values: &[&str]) -> Result<(), IoError> {
        self.write_line(values)?;
        self.written += 1;
        Ok(())
    }

    /// Records appended through this writer (header excluded).
    pub fn written(&self) -> u64 {
        self.written
    }

    /// A partial trailing line was found and truncated on open.
    pub fn recovered_tail(&self) -> bool {
        self.recovered_tail
    }

    fn write_line(&mut self, values: &[&str]) -> Result<(), IoError> {
        let unwritable = |detail: String| IoError::DestinationUnwritable {
            path: self.path.display().to_string(),
            detail,
        };
        let line = csv_line(values).map_err(&unwritable)?;
        self.file.write_all(&line).map_err(|e| unwritable(e.to_string()))?;
        self.file.sync_data().map_err(|e| unwritable(e.to_string()))
    }
}

fn csv_line(values: &[&str]) -> Result<Vec<u8>, String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(values).map_err(|e| e.to_string())?;
    writer.into_inner().map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use vulnbase_recon::model::Record;

    fn sample_set() -> RecordSet {
        let mut set = RecordSet::new(vec!["id".into(), "v".into()]);
        for (id, v) in [("A", "1"), ("B", "2")] {
            let mut r = Record::new();
            r.set("id", id);
            r.set("v", v);
            set.push(r);
        }
        set
    }

    #[test]
    fn replace_atomic_writes_and_cleans_up() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested").join("base.csv");

        replace_atomic(&sample_set(), &dest).unwrap();
        let content = fs::read_to_string(&dest).unwrap();
        assert_eq!(content, "id,v\nA,1\nB,2\n");
        assert!(!dest.with_file_name("base.csv.part").exists());
    }

    #[test]
    fn failed_replace_leaves_prior_baseline_untouched() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("base.csv");
        fs::write(&dest, "id,v\nOLD,1\n").unwrap();

        // Unwritable: the would-be parent directory is a regular file.
        let bad_dest = dest.join("impossible.csv");
        let err = replace_atomic(&sample_set(), &bad_dest).unwrap_err();
        assert!(matches!(err, IoError::DestinationUnwritable { .. }));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "id,v\nOLD,1\n");
    }

    #[test]
    fn load_checkpoint_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let state = load_checkpoint(&dir.path().join("absent.csv"), "id").unwrap();
        assert!(state.keys.is_empty());
        assert!(!state.truncated_tail);
    }

    #[test]
    fn load_checkpoint_reads_identity_column() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.csv");
        fs::write(&dest, "CVE,epss\nCVE-2024-1,0.5\nCVE-2024-2,0.1\n").unwrap();

        let state = load_checkpoint(&dest, "cve").unwrap();
        assert_eq!(state.keys.len(), 2);
        assert!(state.keys.contains("CVE-2024-1"));
        assert!(!state.truncated_tail);
    }

    #[test]
    fn load_checkpoint_skips_truncated_tail() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.csv");
        // Crash mid-write: the last line has no terminator.
        fs::write(&dest, "cve,epss\nCVE-2024-1,0.5\nCVE-2024-2,0.").unwrap();

        let state = load_checkpoint(&dest, "cve").unwrap();
        assert!(state.truncated_tail);
        assert!(state.keys.contains("CVE-2024-1"));
        assert!(!state.keys.contains("CVE-2024-2"));
    }

    #[test]
    fn load_checkpoint_rejects_unknown_identity_field() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.csv");
        fs::write(&dest, "a,b\n1,2\n").unwrap();

        let err = load_checkpoint(&dest, "cve").unwrap_err();
        assert!(matches!(err, IoError::Parse { .. }));
    }

    #[test]
    fn append_writer_writes_header_once() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("scores.csv");
        let header = vec!["cve".to_string(), "epss".to_string()];

        {
            let mut w = AppendWriter::open(&dest, &header).unwrap();
            w.append(&["CVE-2024-1", "0.5"]).unwrap();
            assert_eq!(w.written(), 1);
        }
        {
            let mut w = AppendWriter::open(&dest, &header).unwrap();
            w.append(&["CVE-2024-2", "0.1"]).unwrap();
        }

        let content = fs::read_to_string(&dest).unwrap();
        assert_eq!(content, "cve,epss\nCVE-2024-1,0.5\nCVE-2024-2,0.1\n");
    }

    #[test]
    fn append_writer_truncates_partial_tail() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("scores.csv");
        fs::write(&dest, "cve,epss\nCVE-2024-1,0.5\nCVE-2024-2,0.").unwrap();

        let header = vec!["cve".to_string(), "epss".to_string()];
        let mut w = AppendWriter::open(&dest, &header).unwrap();
        assert!(w.recovered_tail());
        w.append(&["CVE-2024-2", "0.17"]).unwrap();
        drop(w);

        let content = fs::read_to_string(&dest).unwrap();
        assert_eq!(content, "cve,epss\nCVE-2024-1,0.5\nCVE-2024-2,0.17\n");
    }

    #[test]
    fn append_writer_quotes_embedded_delimiters() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("rows.csv");
        let header = vec!["id".to_string(), "note".to_string()];

        let mut w = AppendWriter::open(&dest, &header).unwrap();
        w.append(&["A", "one, two"]).unwrap();
        drop(w);

        let content = fs::read_to_string(&dest).unwrap();
        assert_eq!(content, "id,note\nA,\"one, two\"\n");
    }
}
