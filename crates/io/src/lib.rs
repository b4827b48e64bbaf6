//! `vulnbase-io` — record-set file I/O: CSV reading/writing, durable
//! persistence (atomic replace and fsync-per-record append), resume
//! checkpoints.

pub mod checkpoint;
pub mod csv;
pub mod error;
pub mod persist;

pub use checkpoint::Progress;
pub use error::IoError;
pub use persist::{load_checkpoint, replace_atomic, AppendWriter, CheckpointState};
