use std::fmt;

#[derive(Debug)]
pub enum IoError {
    /// Source file cannot be opened or read.
    Read { path: String, detail: String },
    /// File contents are not a usable CSV record set.
    Parse { path: String, detail: String },
    /// Destination cannot be created or replaced. The prior baseline is
    /// left untouched: all replacement goes through `.part` + rename.
    DestinationUnwritable { path: String, detail: String },
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, detail } => write!(f, "cannot read {path}: {detail}"),
            Self::Parse { path, detail } => write!(f, "cannot parse {path}: {detail}"),
            Self::DestinationUnwritable { path, detail } => {
                write!(f, "destination {path} unwritable: {detail}")
            }
        }
    }
}

impl std::error::Error for IoError {}
