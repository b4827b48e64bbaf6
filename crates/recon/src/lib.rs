//! `vulnbase-recon` — incremental dataset reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded record sets, returns the merged
//! set plus a change report. No CLI or IO dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod model;
pub mod partition;
pub mod report;

pub use config::{MergeMode, SourceConfig};
pub use engine::reconcile;
pub use error::ReconError;
pub use model::{Record, RecordSet};
pub use report::{ChangeKind, ChangeReport, ReconcileOutcome};
