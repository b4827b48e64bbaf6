use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (missing field, bad mode combination, etc.).
    ConfigValidation(String),
    /// Neither record set has a recognizable identity column.
    IdentityFieldNotFound { field: String },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::IdentityFieldNotFound { field } => {
                write!(f, "identity field '{field}' not found in baseline or incoming header")
            }
        }
    }
}

impl std::error::Error for ReconError {}
