use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::{MergeMode, SourceConfig};
use crate::error::ReconError;
use crate::freshness;
use crate::model::{canonical_field, Record, RecordSet};
use crate::report::{ChangeKind, ChangeReport, KeyChange, ReconcileOutcome};

/// Reconcile a freshly fetched record set against the persisted baseline.
///
/// Pure: consults nothing but its inputs (no clock, no filesystem, no
/// network), so a run can be replayed and tested in isolation. Returns the
/// merged set (exactly one record per surviving identity key) and an
/// exhaustive change report.
///
/// Rows without a usable identity value never crash the merge: they are
/// excluded and counted. Duplicate identity keys within the incoming set
/// fold through the same per-key rules, so the uniqueness invariant holds
/// for all inputs.
pub fn reconcile(
    config: &SourceConfig,
    baseline: &RecordSet,
    incoming: &RecordSet,
) -> Result<ReconcileOutcome, ReconError> {
    let in_baseline = baseline.resolve_field(&config.identity_field).is_some();
    let in_incoming = incoming.resolve_field(&config.identity_field).is_some();
    if !in_baseline && !in_incoming {
        return Err(ReconError::IdentityFieldNotFound {
            field: config.identity_field.clone(),
        });
    }

    // No freshness field configured → append-only dedup, whatever the mode.
    let freshness_field = match config.mode {
        MergeMode::FreshnessMerge => config.freshness_field.as_deref(),
        MergeMode::DedupAppend => None,
    };

    // Key order: baseline rows first, then new incoming keys in fetch order.
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, (Record, ChangeKind)> = HashMap::new();
    let mut report = ChangeReport::default();

    for record in &baseline.records {
        let Some(key) = identity_of(record, &config.identity_field) else {
            report.skipped_malformed_baseline += 1;
            continue;
        };
        // The persisted baseline never holds duplicate keys; if a
        // hand-edited file does, the first occurrence wins.
        if merged.contains_key(&key) {
            continue;
        }
        order.push(key.clone());
        merged.insert(key, (record.clone(), ChangeKind::Retained));
    }

    for record in &incoming.records {
        let Some(key) = identity_of(record, &config.identity_field) else {
            report.skipped_malformed += 1;
            continue;
        };
        match merged.get_mut(&key) {
            None => {
                order.push(key.clone());
                merged.insert(key, (record.clone(), ChangeKind::Added));
            }
            Some((current, kind)) => {
                let newer = match freshness_field {
                    Some(field) => {
                        let theirs = record.get(field).unwrap_or("");
                        let ours = current.get(field).unwrap_or("");
                        // Equal freshness keeps the current row: no churn on
                        // no-op re-fetches.
                        freshness::compare(theirs, ours) == Ordering::Greater
                    }
                    None => false,
                };
                if newer {
                    *current = record.clone();
                    if *kind != ChangeKind::Added {
                        *kind = ChangeKind::Updated;
                    }
                } else if *kind == ChangeKind::Retained {
                    *kind = ChangeKind::Unchanged;
                }
            }
        }
    }

    let mut out = RecordSet::new(merged_header(baseline, incoming));
    for key in order {
        if let Some((record, kind)) = merged.remove(&key) {
            out.push(record);
            report.changes.push(KeyChange { key, kind });
        }
    }

    Ok(ReconcileOutcome { merged: out, report })
}

fn identity_of(record: &Record, field: &str) -> Option<String> {
    let value = record.get(field)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Union of both headers: baseline order first, incoming extras appended.
fn merged_header(baseline: &RecordSet, incoming: &RecordSet) -> Vec<String> {
    let mut header = if baseline.header.is_empty() {
        incoming.header.clone()
    } else {
        baseline.header.clone()
    };
    for name in &incoming.header {
        let wanted = canonical_field(name);
        if !header.iter().any(|h| canonical_field(h) == wanted) {
            header.push(name.clone());
        }
    }
    header
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
