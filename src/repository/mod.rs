//! Repository layer for local persistence.
//!
//! One SQLite store holds the extracted tender records plus the sync
//! metadata the orchestrator needs for incremental windows.

mod process;

pub use process::{ProcessRepository, StoredProcess};

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to the epoch.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
