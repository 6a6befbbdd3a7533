//! Transports and parsers for the procurement portal.

pub mod browser;
pub mod form_state;
mod http_client;
pub mod http_search;
pub mod normalize;
pub mod parser;

pub use browser::{BrowserEngineConfig, BrowserSearchTransport, Locator};
pub use form_state::{FormState, CLIENT_WINDOW_FIELD, VIEW_STATE_FIELD};
pub use http_client::{PortalClient, RetryPolicy, USER_AGENT};
pub use http_search::HttpSearchTransport;
pub use parser::{parse_results, ParsedResults, RESULTS_TABLE_ID};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ExtractedProcess, PaginationInfo, SearchCriteria};

/// Result of one portal search, tagged with the transport that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Records returned, after row validation.
    pub processes: Vec<ExtractedProcess>,
    /// Count of records in `processes`.
    pub total_found: u64,
    /// Page metadata, estimated where the portal exposes no exact count.
    pub pagination: PaginationInfo,
    /// Which transport produced this outcome (`"http"` or `"browser"`).
    pub method: String,
}

impl SearchOutcome {
    pub fn new(
        processes: Vec<ExtractedProcess>,
        pagination: PaginationInfo,
        method: &str,
    ) -> Self {
        Self {
            total_found: processes.len() as u64,
            processes,
            pagination,
            method: method.to_string(),
        }
    }
}

/// Resolve relative detail links against the portal base URL.
///
/// The result table carries hrefs as the page emitted them; absolute URLs
/// pass through untouched, unresolvable ones are kept raw rather than lost.
pub fn resolve_detail_urls(processes: &mut [ExtractedProcess], base_url: &str) {
    let base = match url::Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return,
    };
    for process in processes {
        if let Some(href) = process.detail_url.take() {
            process.detail_url = match base.join(&href) {
                Ok(resolved) => Some(resolved.to_string()),
                Err(_) => Some(href),
            };
        }
    }
}

/// A way of issuing one search against the portal.
///
/// Implementations own their session state; a single transport instance is
/// used by at most one orchestration run at a time.
#[async_trait]
pub trait SearchTransport: Send {
    /// Tag identifying this transport in search outcomes.
    fn method(&self) -> &'static str;

    /// Run one search and parse the resulting page.
    async fn search(&mut self, criteria: &SearchCriteria) -> Result<SearchOutcome>;

    /// Release any held session resources. Safe to call more than once.
    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_href(href: &str) -> ExtractedProcess {
        let mut p = ExtractedProcess::new();
        p.process_number = "SEL-1".into();
        p.detail_url = Some(href.to_string());
        p
    }

    #[test]
    fn relative_detail_urls_resolve_against_the_base() {
        let mut processes = vec![with_href("/detalle?id=9")];
        resolve_detail_urls(&mut processes, "https://portal.example.gob.pe/buscador");
        assert_eq!(
            processes[0].detail_url.as_deref(),
            Some("https://portal.example.gob.pe/detalle?id=9")
        );
    }

    #[test]
    fn absolute_detail_urls_pass_through() {
        let mut processes = vec![with_href("https://otro.example.com/x")];
        resolve_detail_urls(&mut processes, "https://portal.example.gob.pe/");
        assert_eq!(
            processes[0].detail_url.as_deref(),
            Some("https://otro.example.com/x")
        );
    }

    #[test]
    fn missing_detail_urls_stay_missing() {
        let mut p = ExtractedProcess::new();
        p.process_number = "SEL-2".into();
        let mut processes = vec![p];
        resolve_detail_urls(&mut processes, "https://portal.example.gob.pe/");
        assert_eq!(processes[0].detail_url, None);
    }

    #[test]
    fn outcome_counts_its_processes() {
        let outcome = SearchOutcome::new(
            vec![with_href("/a"), with_href("/b")],
            PaginationInfo::single_page(2),
            "http",
        );
        assert_eq!(outcome.total_found, 2);
        assert_eq!(outcome.method, "http");
    }
}
