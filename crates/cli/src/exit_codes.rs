//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scheduled jobs rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | data             | Config / parse / persistence codes       |
//! | 50-59   | fetch            | External data source codes               |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Data (3-9)
// =============================================================================

/// Source config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Input file unreadable or not a usable CSV record set.
pub const EXIT_PARSE: u8 = 4;

/// Destination cannot be created or replaced. The prior baseline file is
/// left untouched (rename-style replacement).
pub const EXIT_DESTINATION: u8 = 5;

/// No recognizable identity column in either record set.
pub const EXIT_IDENTITY: u8 = 6;

// =============================================================================
// Fetch (50-59)
// =============================================================================

/// Upstream returned a non-retryable error, or retries were exhausted.
pub const EXIT_FETCH_UPSTREAM: u8 = 50;

/// Upstream rate limit persisted past the configured retry budget.
pub const EXIT_FETCH_RATE_LIMIT: u8 = 51;
