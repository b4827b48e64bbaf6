use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// Normalize a field name for matching: strip BOM, trim, lowercase.
///
/// Upstream exports disagree on header casing ("id" vs "CVE_ID" vs "cve"),
/// and spreadsheet-exported CSVs prefix the first header with a BOM.
pub fn canonical_field(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single row: field values keyed by canonical field name.
///
/// Field order lives in the owning [`RecordSet`] header; records from sets
/// with partially-overlapping field sets simply read as empty for fields
/// they don't carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(canonical_field(field), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(&canonical_field(field)).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Record Set
// ---------------------------------------------------------------------------

/// The state of a dataset at a point in time: a header plus its rows.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    /// Field names in output order, original casing (BOM/whitespace stripped).
    pub header: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(header: Vec<String>) -> Self {
        let header = header
            .into_iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        Self { header, records: Vec::new() }
    }

    /// An absent dataset (first run, no prior file).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Locate a field by name, case-insensitively. Returns the header's own
    /// spelling so callers can report the column they actually matched.
    pub fn resolve_field(&self, name: &str) -> Option<&str> {
        let wanted = canonical_field(name);
        self.header
            .iter()
            .find(|h| canonical_field(h) == wanted)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Project a record onto this set's header. Missing fields read as "".
    pub fn row_values<'a>(&self, record: &'a Record) -> Vec<&'a str> {
        self.header
            .iter()
            .map(|h| record.get(h).unwrap_or(""))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
