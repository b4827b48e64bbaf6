use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// Human-inspectable progress marker for long-running append jobs.
///
/// Advisory only: the destination's identity column is the authoritative
/// resume state (see [`crate::persist::load_checkpoint`]); this sidecar
/// exists so an operator can see where a job stands without parsing the
/// whole output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Next input position to attempt.
    pub position: u64,
    /// Records durably appended so far.
    pub written: u64,
}

impl Progress {
    /// Load from `path`. Missing or corrupt files read as a fresh start,
    /// since the real resume state is rebuilt from the destination anyway.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        let unwritable = |detail: String| IoError::DestinationUnwritable {
            path: path.display().to_string(),
            detail,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| unwritable(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| unwritable(e.to_string()))
    }
}

/// Sidecar path for a destination: `epss_DB.csv` → `epss_DB.progress.json`.
pub fn sidecar_path(dest: &Path) -> PathBuf {
    dest.with_extension("progress.json")
}
