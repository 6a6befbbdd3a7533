//! Pagination metadata and sync run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rows per result page assumed when the portal exposes only a page count.
pub const ASSUMED_PAGE_SIZE: u64 = 10;

/// Best-effort pagination info for one result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    /// Page the parsed HTML corresponds to, 1-based.
    pub current_page: u32,
    /// Total pages; always at least 1.
    pub total_pages: u32,
    /// Total record count. When `is_estimate` is set this is derived as
    /// `total_pages * ASSUMED_PAGE_SIZE`, not an exact portal-reported count.
    pub total: u64,
    /// Whether `total` is the documented page-size approximation.
    pub is_estimate: bool,
}

impl PaginationInfo {
    /// Pagination derived from a paginator's "current de total" text.
    pub fn estimated(current_page: u32, total_pages: u32) -> Self {
        let total_pages = total_pages.max(1);
        Self {
            current_page: current_page.max(1),
            total_pages,
            total: total_pages as u64 * ASSUMED_PAGE_SIZE,
            is_estimate: true,
        }
    }

    /// Single page holding exactly the rows that were parsed.
    pub fn single_page(rows: u64) -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
            total: rows,
            is_estimate: false,
        }
    }

    /// Fallback when no result table could be located at all.
    pub fn none_found() -> Self {
        Self::single_page(0)
    }
}

impl Default for PaginationInfo {
    fn default() -> Self {
        Self::none_found()
    }
}

/// Counters accumulated over one orchestration run.
///
/// Accumulated across keyword batches and returned whole; never exposed
/// partially while a run is in flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Records returned by the transport(s), before dedup.
    pub found: u64,
    /// New records inserted.
    pub created: u64,
    /// Existing records updated in place.
    pub updated: u64,
    /// Records not persisted: duplicates of stored rows, or below the
    /// relevance cutoff for technology-focused sweeps.
    pub skipped: u64,
    /// Records that individually failed to persist.
    pub errored: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    pub fn start() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_total_is_pages_times_page_size() {
        let p = PaginationInfo::estimated(1, 5);
        assert_eq!(p.total, 5 * ASSUMED_PAGE_SIZE);
        assert!(p.is_estimate);
    }

    #[test]
    fn total_pages_never_below_one() {
        assert_eq!(PaginationInfo::estimated(1, 0).total_pages, 1);
        assert_eq!(PaginationInfo::single_page(0).total_pages, 1);
        assert_eq!(PaginationInfo::none_found().total_pages, 1);
    }

    #[test]
    fn single_page_total_is_exact() {
        let p = PaginationInfo::single_page(7);
        assert_eq!(p.total, 7);
        assert!(!p.is_estimate);
    }

    #[test]
    fn stats_track_duration() {
        let mut stats = SyncStats::start();
        assert!(stats.duration_secs().is_none());
        stats.finish();
        assert!(stats.duration_secs().is_some());
    }
}
