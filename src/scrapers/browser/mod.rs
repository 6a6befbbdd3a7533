//! Browser-driven search transport.
//!
//! The portal renders its search form through client-side scripting that
//! the plain HTTP transport cannot evaluate, so this transport drives a
//! controlled Chromium session over CDP: activate the search tab, populate
//! whatever controls resolve, click search, and wait for a completion
//! signal. Every wait has a degraded-success path: a timeout returns the
//! currently rendered HTML rather than failing.

mod config;
mod locate;

pub use config::BrowserEngineConfig;
pub use locate::Locator;

use scraper::{Html, Selector};

use crate::scrapers::parser::RESULTS_TABLE_ID;

/// Text markers the portal shows instead of a result table.
const NO_RESULTS_MARKERS: &[&str] = &[
    "no se encontraron datos",
    "no se encontraron",
    "sin resultados",
    "no hay datos",
];

/// Signal that ended the post-search wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A results table is present in the rendered page.
    ResultsTable,
    /// The portal rendered an explicit "no results" marker.
    EmptyMarker,
}

/// Decide whether a rendered page has finished producing search results.
///
/// `None` means neither signal is present yet; the caller keeps polling
/// until its timeout and then proceeds with whatever is rendered.
pub fn detect_completion(html: &str) -> Option<WaitOutcome> {
    let document = Html::parse_document(html);
    let by_id = Selector::parse(&format!(r#"table[id="{}"]"#, RESULTS_TABLE_ID))
        .expect("static selector");
    let by_class = Selector::parse(r#"table[class*="ui-datatable"]"#).expect("static selector");

    if document.select(&by_id).next().is_some() || document.select(&by_class).next().is_some() {
        return Some(WaitOutcome::ResultsTable);
    }

    let lowered = html.to_lowercase();
    if NO_RESULTS_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return Some(WaitOutcome::EmptyMarker);
    }

    None
}

#[cfg(feature = "browser")]
mod transport {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
    use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use chrono::{Datelike, NaiveDate, Utc};
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    use super::config::BrowserEngineConfig;
    use super::locate::{
        click_script, fill_script, select_script, CONTRACT_OBJECT_CANDIDATES,
        DATE_FROM_CANDIDATES, DATE_TO_CANDIDATES, DESCRIPTION_CANDIDATES, ENTITY_CANDIDATES,
        SEARCH_BUTTON_CANDIDATES, SERVICE_OPTION_LABELS, SERVICE_OPTION_VALUES, TAB_CANDIDATES,
        YEAR_CANDIDATES,
    };
    use super::{detect_completion, WaitOutcome};
    use crate::error::{Result, ScrapeError};
    use crate::models::SearchCriteria;
    use crate::scrapers::http_client::USER_AGENT;
    use crate::scrapers::parser::parse_results;
    use crate::scrapers::{resolve_detail_urls, SearchOutcome, SearchTransport};

    /// Interval between completion polls during the post-search wait.
    const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    fn transport_err(err: impl std::fmt::Display) -> ScrapeError {
        ScrapeError::Transport(err.to_string())
    }

    /// Search transport driving a headless Chromium session.
    ///
    /// The browser process is a scoped resource: launched lazily on first
    /// search, reused across searches within one run, and terminated when
    /// the transport is closed or dropped. One instance serves one
    /// orchestration run; the session is not safe for concurrent reuse.
    pub struct BrowserSearchTransport {
        config: BrowserEngineConfig,
        search_url: String,
        browser: Option<Arc<Mutex<Browser>>>,
    }

    impl BrowserSearchTransport {
        /// Common Chrome executable paths to check.
        const CHROME_PATHS: &'static [&'static str] = &[
            // Linux
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            // macOS
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            // Common install locations
            "/opt/google/chrome/google-chrome",
        ];

        pub fn new(config: BrowserEngineConfig, search_url: String) -> Self {
            Self {
                config,
                search_url,
                browser: None,
            }
        }

        /// Find a Chrome executable.
        fn find_chrome() -> Result<std::path::PathBuf> {
            for path in Self::CHROME_PATHS {
                let p = std::path::Path::new(path);
                if p.exists() {
                    info!("Found Chrome at: {}", path);
                    return Ok(p.to_path_buf());
                }
            }

            for cmd in &[
                "google-chrome",
                "google-chrome-stable",
                "chromium",
                "chromium-browser",
            ] {
                if let Ok(path) = which::which(cmd) {
                    info!("Found Chrome in PATH: {}", path.display());
                    return Ok(path);
                }
            }

            Err(ScrapeError::Transport(
                "Chrome/Chromium not found; install it or use the http transport".into(),
            ))
        }

        /// Launch the browser if not already running.
        async fn ensure_browser(&mut self) -> Result<()> {
            if self.browser.is_some() {
                return Ok(());
            }

            info!("Launching browser (headless={})", self.config.headless);
            let chrome_path = Self::find_chrome()?;

            let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
            if !self.config.headless {
                builder = builder.with_head();
            }
            builder = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--window-size=1920,1080")
                .arg("--no-sandbox") // Often needed for headless in containers
                .arg("--disable-gpu");
            for arg in &self.config.chrome_args {
                builder = builder.arg(arg);
            }

            let config = builder.build().map_err(transport_err)?;
            let (browser, mut handler) = Browser::launch(config).await.map_err(transport_err)?;

            // Spawn handler task
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            self.browser = Some(Arc::new(Mutex::new(browser)));
            Ok(())
        }

        /// Evaluate an interaction script, reporting whether it succeeded.
        async fn eval_flag(page: &Page, script: String) -> bool {
            match page.evaluate(script).await {
                Ok(result) => result.into_value::<bool>().unwrap_or(false),
                Err(err) => {
                    debug!("script evaluation failed: {}", err);
                    false
                }
            }
        }

        async fn settle(&self) {
            tokio::time::sleep(Duration::from_secs(self.config.settle)).await;
        }

        /// Wait for the initial page to reach a usable ready state.
        async fn wait_page_ready(&self, page: &Page) {
            let script = r#"
                new Promise((resolve) => {
                    if (document.readyState === 'complete' || document.readyState === 'interactive') {
                        resolve(document.readyState);
                    } else {
                        document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                        setTimeout(() => resolve('timeout'), 10000);
                    }
                })
            "#;

            let timeout = Duration::from_secs(self.config.timeout);
            match tokio::time::timeout(timeout, page.evaluate(script.to_string())).await {
                Ok(Ok(result)) => {
                    let state: String = result.into_value().unwrap_or_else(|_| "unknown".into());
                    debug!("page ready state: {}", state);
                }
                Ok(Err(err)) => debug!("could not check ready state: {}", err),
                Err(_) => warn!("timeout waiting for page ready state"),
            }
        }

        /// Activate the process-search tab by simulated click.
        async fn activate_search_tab(&self, page: &Page) {
            if Self::eval_flag(page, click_script(TAB_CANDIDATES)).await {
                info!("process-search tab activated");
            } else {
                warn!("could not locate the process-search tab; proceeding on current pane");
            }
            self.settle().await;
        }

        /// Populate whatever criterion controls resolve.
        ///
        /// A control that never resolves is logged and skipped: partial
        /// population still permits a query, possibly broader than intended.
        async fn populate_form(&self, page: &Page, criteria: &SearchCriteria) {
            // Mandatory portal filters first: contract object and year.
            if Self::eval_flag(
                page,
                select_script(
                    CONTRACT_OBJECT_CANDIDATES,
                    SERVICE_OPTION_LABELS,
                    SERVICE_OPTION_VALUES,
                ),
            )
            .await
            {
                info!("contract-object filter set to service");
            } else {
                warn!("contract-object dropdown not found");
            }

            let target_year = criteria.effective_year().to_string();
            let current_year = Utc::now().year().to_string();
            let year_options = [target_year.as_str(), "2024", "2023", current_year.as_str()];
            if Self::eval_flag(
                page,
                select_script(YEAR_CANDIDATES, &year_options, &year_options),
            )
            .await
            {
                info!("convocation year set to {}", target_year);
            } else {
                warn!("convocation-year dropdown not found");
            }

            // Publication dates default to the full target year when unset.
            let year = criteria.effective_year();
            let from = criteria
                .date_from
                .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1));
            let to = criteria
                .date_to
                .or_else(|| NaiveDate::from_ymd_opt(year, 12, 31));
            if let Some(from) = from {
                let value = from.format("%d/%m/%Y").to_string();
                if !Self::eval_flag(page, fill_script(DATE_FROM_CANDIDATES, &value)).await {
                    warn!("date-from control not found");
                }
            }
            if let Some(to) = to {
                let value = to.format("%d/%m/%Y").to_string();
                if !Self::eval_flag(page, fill_script(DATE_TO_CANDIDATES, &value)).await {
                    warn!("date-to control not found");
                }
            }

            if let Some(ref keyword) = criteria.keyword {
                if Self::eval_flag(page, fill_script(DESCRIPTION_CANDIDATES, keyword)).await {
                    info!("description filter set to {:?}", keyword);
                } else {
                    warn!("description control not found");
                }
            }

            if let Some(ref entity) = criteria.entity {
                if !Self::eval_flag(page, fill_script(ENTITY_CANDIDATES, entity)).await {
                    warn!("entity control not found");
                }
            }
        }

        /// Click search and wait for a completion signal or the timeout.
        ///
        /// Timing out is degraded success: whatever HTML is rendered at
        /// that point is returned for parsing.
        async fn trigger_and_wait(&self, page: &Page) -> Result<String> {
            if Self::eval_flag(page, click_script(SEARCH_BUTTON_CANDIDATES)).await {
                info!("search triggered");
            } else {
                warn!("could not locate the search button");
            }

            let deadline = Instant::now() + Duration::from_secs(self.config.timeout);
            loop {
                let html = page.content().await.map_err(transport_err)?;
                match detect_completion(&html) {
                    Some(WaitOutcome::ResultsTable) => {
                        debug!("results table rendered");
                        break;
                    }
                    Some(WaitOutcome::EmptyMarker) => {
                        debug!("no-results marker rendered");
                        break;
                    }
                    None if Instant::now() >= deadline => {
                        warn!("timed out waiting for results; using current page state");
                        break;
                    }
                    None => tokio::time::sleep(WAIT_POLL_INTERVAL).await,
                }
            }

            // Let any in-flight partial render finish before the final read.
            self.settle().await;
            page.content().await.map_err(transport_err)
        }

        /// Drive one full search interaction on an open page.
        async fn drive(&self, page: &Page, criteria: &SearchCriteria) -> Result<String> {
            page.execute(SetUserAgentOverrideParams::new(USER_AGENT.to_string()))
                .await
                .map_err(transport_err)?;

            info!("navigating to {}", self.search_url);
            let nav = NavigateParams::builder()
                .url(self.search_url.clone())
                .build()
                .map_err(transport_err)?;
            page.execute(nav).await.map_err(transport_err)?;

            self.wait_page_ready(page).await;
            self.activate_search_tab(page).await;
            self.populate_form(page, criteria).await;
            self.trigger_and_wait(page).await
        }
    }

    #[async_trait]
    impl SearchTransport for BrowserSearchTransport {
        fn method(&self) -> &'static str {
            "browser"
        }

        async fn search(&mut self, criteria: &SearchCriteria) -> Result<SearchOutcome> {
            self.ensure_browser().await?;

            let browser = self
                .browser
                .as_ref()
                .ok_or_else(|| ScrapeError::Transport("browser session missing".into()))?
                .clone();
            let guard = browser.lock().await;
            let page = guard.new_page("about:blank").await.map_err(transport_err)?;

            // Close the page on every exit path before surfacing the result.
            let outcome = self.drive(&page, criteria).await;
            let _ = page.close().await;
            let html = outcome?;

            let parsed = parse_results(&html)?;
            let mut processes = parsed.processes;
            resolve_detail_urls(&mut processes, &self.search_url);
            Ok(SearchOutcome::new(processes, parsed.pagination, self.method()))
        }

        /// Terminate the browser session. Dropping the handle kills the
        /// child process, so release holds on abnormal exits too.
        async fn close(&mut self) {
            if self.browser.take().is_some() {
                debug!("browser session released");
            }
        }
    }
}

#[cfg(feature = "browser")]
pub use transport::BrowserSearchTransport;

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
mod transport {
    use async_trait::async_trait;

    use super::config::BrowserEngineConfig;
    use crate::error::{Result, ScrapeError};
    use crate::models::SearchCriteria;
    use crate::scrapers::{SearchOutcome, SearchTransport};

    pub struct BrowserSearchTransport {
        _config: BrowserEngineConfig,
        _search_url: String,
    }

    impl BrowserSearchTransport {
        pub fn new(config: BrowserEngineConfig, search_url: String) -> Self {
            Self {
                _config: config,
                _search_url: search_url,
            }
        }
    }

    #[async_trait]
    impl SearchTransport for BrowserSearchTransport {
        fn method(&self) -> &'static str {
            "browser"
        }

        async fn search(&mut self, _criteria: &SearchCriteria) -> Result<SearchOutcome> {
            Err(ScrapeError::Transport(
                "Browser support not compiled. Rebuild with: cargo build --features browser"
                    .into(),
            ))
        }
    }
}

#[cfg(not(feature = "browser"))]
pub use transport::BrowserSearchTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_table_is_a_completion_signal() {
        let html = format!(
            r#"<html><body><table id="{}"><tbody><tr><td>x</td></tr></tbody></table></body></html>"#,
            RESULTS_TABLE_ID
        );
        assert_eq!(detect_completion(&html), Some(WaitOutcome::ResultsTable));
    }

    #[test]
    fn datatable_class_is_a_completion_signal() {
        let html = r#"<table class="ui-datatable ui-widget"><tbody></tbody></table>"#;
        assert_eq!(detect_completion(html), Some(WaitOutcome::ResultsTable));
    }

    #[test]
    fn no_results_marker_is_a_completion_signal() {
        let html = "<html><body><span>No se encontraron datos</span></body></html>";
        assert_eq!(detect_completion(html), Some(WaitOutcome::EmptyMarker));
    }

    #[test]
    fn pending_page_has_no_signal_yet() {
        // Neither a table nor a marker: the caller keeps polling and, at
        // timeout, proceeds with this HTML as degraded success.
        let html = "<html><body><div class='ui-progressbar'>cargando</div></body></html>";
        assert_eq!(detect_completion(html), None);
    }
}
