use std::fmt;

// ---------------------------------------------------------------------------
// Partition id
// ---------------------------------------------------------------------------

/// Partition assignment for one identity value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionId {
    /// Year segment plus thousand-bucket of the numeric tail
    /// (CVE-2024-12345 → 2024/12).
    Bucket { year: u16, group: u32 },
    /// Identity value does not match the structured pattern.
    Unpartitionable,
}

impl PartitionId {
    /// Directory path of this partition relative to the partition root.
    pub fn relative_dir(&self) -> String {
        match self {
            Self::Bucket { year, group } => format!("{year}/{group}"),
            Self::Unpartitionable => "unpartitionable".into(),
        }
    }

    /// File name of this partition's CSV.
    pub fn file_name(&self) -> String {
        match self {
            Self::Bucket { year, group } => format!("CVE-{year}-{group}.csv"),
            Self::Unpartitionable => "unpartitionable.csv".into(),
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket { year, group } => write!(f, "{year}/{group}"),
            Self::Unpartitionable => write!(f, "unpartitionable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Derive the partition for an identity value.
///
/// Pure function of the value alone, stable across runs: re-partitioning a
/// previously-partitioned record always lands it in the same bucket.
pub fn partition_key(identity: &str) -> PartitionId {
    let parts: Vec<&str> = identity.trim().split('-').collect();
    if parts.len() != 3 || !parts[0].eq_ignore_ascii_case("cve") {
        return PartitionId::Unpartitionable;
    }
    if parts[1].len() != 4 || !parts[1].bytes().all(|b| b.is_ascii_digit()) {
        return PartitionId::Unpartitionable;
    }
    let Ok(year) = parts[1].parse::<u16>() else {
        return PartitionId::Unpartitionable;
    };
    let Ok(number) = parts[2].parse::<u32>() else {
        return PartitionId::Unpartitionable;
    };
    PartitionId::Bucket { year, group: number / 1000 }
}
