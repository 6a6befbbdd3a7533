//! Search criteria passed to the portal transports.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};

/// Immutable description of one portal search.
///
/// All filters are optional; an empty criteria set is a legal (very broad)
/// query. Construct through the builder methods so the date-range invariant
/// holds for every value that escapes this module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Free-text filter on the object-of-contract description.
    pub keyword: Option<String>,
    /// Contracting entity name.
    pub entity: Option<String>,
    /// Publication date range start (inclusive).
    pub date_from: Option<NaiveDate>,
    /// Publication date range end (inclusive).
    pub date_to: Option<NaiveDate>,
    /// Selection process type.
    pub process_type: Option<String>,
    /// Process status filter.
    pub status: Option<String>,
    /// Convocation year.
    pub year: Option<i32>,
    /// Result page, 1-based.
    pub page: u32,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Default::default()
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Set the publication date range. Fails when start > end.
    pub fn with_date_range(mut self, from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(ScrapeError::Criteria(format!(
                "date range start {} is after end {}",
                from, to
            )));
        }
        self.date_from = Some(from);
        self.date_to = Some(to);
        Ok(self)
    }

    pub fn with_process_type(mut self, process_type: impl Into<String>) -> Self {
        self.process_type = Some(process_type.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Year to submit for year-scoped searches: the explicit year if set,
    /// otherwise the current year.
    pub fn effective_year(&self) -> i32 {
        self.year.unwrap_or_else(|| Utc::now().year())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn date_range_accepts_ordered_dates() {
        let c = SearchCriteria::new()
            .with_date_range(d(2024, 1, 1), d(2024, 12, 31))
            .unwrap();
        assert_eq!(c.date_from, Some(d(2024, 1, 1)));
        assert_eq!(c.date_to, Some(d(2024, 12, 31)));
    }

    #[test]
    fn date_range_rejects_inverted_dates() {
        let result = SearchCriteria::new().with_date_range(d(2024, 6, 1), d(2024, 1, 1));
        assert!(matches!(result, Err(ScrapeError::Criteria(_))));
    }

    #[test]
    fn same_day_range_is_valid() {
        let c = SearchCriteria::new()
            .with_date_range(d(2024, 3, 15), d(2024, 3, 15))
            .unwrap();
        assert_eq!(c.date_from, c.date_to);
    }

    #[test]
    fn page_is_clamped_to_one() {
        assert_eq!(SearchCriteria::new().with_page(0).page, 1);
        assert_eq!(SearchCriteria::new().with_page(7).page, 7);
    }

    #[test]
    fn effective_year_prefers_explicit() {
        assert_eq!(SearchCriteria::new().with_year(2023).effective_year(), 2023);
        let current = Utc::now().year();
        assert_eq!(SearchCriteria::new().effective_year(), current);
    }
}
