use serde::Serialize;

use crate::model::RecordSet;

// ---------------------------------------------------------------------------
// Per-key classification
// ---------------------------------------------------------------------------

/// What happened to one identity key during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present only in the incoming set.
    Added,
    /// Present in both; incoming was strictly newer and replaced the row.
    Updated,
    /// Present in both; baseline row kept.
    Unchanged,
    /// Present only in the baseline; survives untouched.
    Retained,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Retained => write!(f, "retained"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyChange {
    pub key: String,
    pub kind: ChangeKind,
}

// ---------------------------------------------------------------------------
// Change report
// ---------------------------------------------------------------------------

/// Exhaustive classification of every identity key in baseline ∪ incoming,
/// plus counts of rows that had no usable identity value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeReport {
    pub changes: Vec<KeyChange>,
    /// Incoming rows with a missing/empty identity value.
    pub skipped_malformed: usize,
    /// Baseline rows with a missing/empty identity value.
    pub skipped_malformed_baseline: usize,
}

impl ChangeReport {
    pub fn keys_with(&self, kind: ChangeKind) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.key.as_str())
            .collect()
    }

    pub fn summary(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary {
            total_keys: self.changes.len(),
            skipped_malformed: self.skipped_malformed,
            skipped_malformed_baseline: self.skipped_malformed_baseline,
            ..ReconcileSummary::default()
        };
        for change in &self.changes {
            match change.kind {
                ChangeKind::Added => summary.added += 1,
                ChangeKind::Updated => summary.updated += 1,
                ChangeKind::Unchanged => summary.unchanged += 1,
                ChangeKind::Retained => summary.retained += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub total_keys: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub retained: usize,
    pub skipped_malformed: usize,
    pub skipped_malformed_baseline: usize,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub merged: RecordSet,
    pub report: ChangeReport,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
