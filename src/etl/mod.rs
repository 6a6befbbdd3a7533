//! Extraction orchestration: windowed, deduplicated sync runs.
//!
//! One run sweeps a set of technology search terms through a transport,
//! merges the results by external process identifier, and reconciles them
//! against the local store inside a single batch-commit scope. Portal
//! access stays strictly sequential; the transports own all throttling.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};
use crate::models::{ExtractedProcess, SearchCriteria, SyncStats};
use crate::repository::ProcessRepository;
use crate::scrapers::SearchTransport;

/// Window applied when no prior sync is recorded.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Sweep terms issued when the caller supplies none.
pub const DEFAULT_MAX_KEYWORDS: usize = 10;

/// Technology search terms swept per run, broadest first.
pub const SWEEP_KEYWORDS: &[&str] = &[
    "sistema",
    "software",
    "aplicativo",
    "plataforma digital",
    "tecnologia",
    "informatica",
    "desarrollo de software",
    "desarrollo web",
    "aplicacion web",
    "sistema web",
    "infraestructura tecnologica",
    "servidor",
    "base de datos",
    "soporte tecnico",
    "mantenimiento de sistemas",
    "ciberseguridad",
    "telecomunicaciones",
    "digitalizacion",
];

/// Caller-tunable knobs for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Explicit lookback in days (full sync). `None` runs incrementally
    /// from the last recorded sync.
    pub days_back: Option<i64>,
    /// Search terms to sweep; empty uses the default technology sweep.
    pub keywords: Vec<String>,
    /// Convocation year filter.
    pub year: Option<i32>,
    /// Cap on default sweep terms per run.
    pub max_keywords: usize,
    /// Drop records that score zero technology relevance.
    pub require_relevance: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            days_back: None,
            keywords: Vec::new(),
            year: None,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            require_relevance: true,
        }
    }
}

/// Resolve the sync date window.
///
/// Incremental runs start at the last recorded sync date, falling back to a
/// fixed lookback when none is recorded; full syncs use the caller's days.
pub fn sync_window(
    last_sync: Option<DateTime<Utc>>,
    days_back: Option<i64>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let from = match days_back {
        Some(days) => today - chrono::Duration::days(days.max(0)),
        None => last_sync
            .map(|ts| ts.date_naive())
            .unwrap_or_else(|| today - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS)),
    };
    (from.min(today), today)
}

enum RecordOutcome {
    Created,
    Updated,
    Skipped,
}

/// Run one sync: sweep, merge, reconcile, commit.
///
/// Per-keyword transport failures are logged and the sweep continues; a
/// form-state failure is a window-level control failure and aborts the run.
/// Per-record persistence failures are counted and never abort the batch.
/// The last-sync timestamp advances only when the whole run succeeds.
pub async fn run_sync(
    repo: &ProcessRepository,
    transport: &mut dyn SearchTransport,
    options: &SyncOptions,
) -> Result<SyncStats> {
    let mut stats = SyncStats::start();

    let today = Utc::now().date_naive();
    let (window_from, window_to) = sync_window(repo.last_sync()?, options.days_back, today);
    info!(
        method = transport.method(),
        "starting sync over {} .. {}", window_from, window_to
    );

    let keywords: Vec<String> = if options.keywords.is_empty() {
        SWEEP_KEYWORDS
            .iter()
            .take(options.max_keywords.max(1))
            .map(|k| k.to_string())
            .collect()
    } else {
        options.keywords.clone()
    };

    let mut merged: BTreeMap<String, ExtractedProcess> = BTreeMap::new();

    for keyword in &keywords {
        let criteria = SearchCriteria::new()
            .with_keyword(keyword.clone())
            .with_date_range(window_from, window_to)?
            .with_year(options.year.unwrap_or_else(|| window_to.year()));

        match transport.search(&criteria).await {
            Ok(outcome) => {
                stats.found += outcome.total_found;
                if outcome.processes.is_empty() {
                    // An empty page is not proof of zero matches; the portal
                    // may have ignored a partially populated form.
                    info!("keyword {:?}: no results returned", keyword);
                }
                merge_results(&mut merged, outcome.processes, &mut stats);
            }
            Err(err @ ScrapeError::FormState(_)) => {
                warn!("aborting run, cannot establish portal state: {}", err);
                return Err(err);
            }
            Err(err) => {
                warn!("keyword {:?} search failed: {}", keyword, err);
            }
        }
    }

    info!(
        "sweep finished: {} found, {} unique processes",
        stats.found,
        merged.len()
    );

    repo.begin()?;
    for process in merged.values() {
        if options.require_relevance && process.relevance == 0 {
            debug!(
                "skipping {:?}: zero technology relevance",
                process.process_number
            );
            stats.skipped += 1;
            continue;
        }

        match persist_one(repo, process) {
            Ok(RecordOutcome::Created) => stats.created += 1,
            Ok(RecordOutcome::Updated) => stats.updated += 1,
            Ok(RecordOutcome::Skipped) => stats.skipped += 1,
            Err(err) => {
                warn!(
                    "failed persisting process {:?}: {}",
                    process.process_number, err
                );
                stats.errored += 1;
            }
        }
    }
    repo.commit()?;
    repo.set_last_sync(Utc::now())?;

    stats.finish();
    info!(
        "sync complete: {} created, {} updated, {} skipped, {} errored",
        stats.created, stats.updated, stats.skipped, stats.errored
    );
    Ok(stats)
}

/// Merge a batch into the cross-keyword dedup map.
///
/// Records without an external identifier cannot be deduplicated or safely
/// re-found later and are dropped here (counted as skipped). On identifier
/// collision the richer extraction wins.
fn merge_results(
    merged: &mut BTreeMap<String, ExtractedProcess>,
    processes: Vec<ExtractedProcess>,
    stats: &mut SyncStats,
) {
    for process in processes {
        let key = process.process_number.trim().to_string();
        if key.is_empty() {
            stats.skipped += 1;
            continue;
        }
        let keep_existing = merged
            .get(&key)
            .map(|existing| existing.richness() >= process.richness())
            .unwrap_or(false);
        if !keep_existing {
            merged.insert(key, process);
        }
    }
}

/// Reconcile one record against the store.
///
/// Duplicates (by exact process-number match, including a lost insert race
/// surfacing as a unique violation) are skipped, not errors.
fn persist_one(repo: &ProcessRepository, process: &ExtractedProcess) -> Result<RecordOutcome> {
    match repo.find_by_process_number(&process.process_number)? {
        Some(stored) => {
            if repo.update_if_changed(&stored, process)? {
                Ok(RecordOutcome::Updated)
            } else {
                Ok(RecordOutcome::Skipped)
            }
        }
        None => match repo.insert(process) {
            Ok(_) => Ok(RecordOutcome::Created),
            Err(ScrapeError::Persistence(err))
                if ProcessRepository::is_unique_violation(&err) =>
            {
                Ok(RecordOutcome::Skipped)
            }
            Err(err) => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    use crate::models::PaginationInfo;
    use crate::scrapers::SearchOutcome;

    /// Transport yielding canned outcomes; repeats the last one when the
    /// queue runs dry.
    struct CannedTransport {
        outcomes: VecDeque<Result<SearchOutcome>>,
        last: Option<SearchOutcome>,
    }

    impl CannedTransport {
        fn new(outcomes: Vec<Result<SearchOutcome>>) -> Self {
            Self {
                outcomes: outcomes.into(),
                last: None,
            }
        }

        fn repeating(outcome: SearchOutcome) -> Self {
            Self {
                outcomes: VecDeque::new(),
                last: Some(outcome),
            }
        }
    }

    #[async_trait]
    impl SearchTransport for CannedTransport {
        fn method(&self) -> &'static str {
            "canned"
        }

        async fn search(&mut self, _criteria: &SearchCriteria) -> Result<SearchOutcome> {
            match self.outcomes.pop_front() {
                Some(Ok(outcome)) => {
                    self.last = Some(outcome.clone());
                    Ok(outcome)
                }
                Some(Err(err)) => Err(err),
                None => self
                    .last
                    .clone()
                    .ok_or_else(|| ScrapeError::Transport("queue empty".into())),
            }
        }
    }

    fn record(number: &str, description: &str) -> ExtractedProcess {
        let mut p = ExtractedProcess::new();
        p.process_number = number.to_string();
        p.entity = "Gobierno Regional".to_string();
        p.description = description.to_string();
        p.status = "Convocado".to_string();
        let (relevance, category) = crate::classify::classify_process(&p);
        p.relevance = relevance;
        p.category = category;
        p
    }

    fn outcome(processes: Vec<ExtractedProcess>) -> SearchOutcome {
        let pagination = PaginationInfo::single_page(processes.len() as u64);
        SearchOutcome::new(processes, pagination, "canned")
    }

    fn single_keyword_options() -> SyncOptions {
        SyncOptions {
            keywords: vec!["sistema".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_run_creates_second_run_skips() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let batch = vec![
            record("SEL-1", "desarrollo de software de planillas"),
            record("SEL-2", "sistema web de tramite documentario"),
        ];
        let mut transport = CannedTransport::repeating(outcome(batch));
        let options = single_keyword_options();

        let first = run_sync(&repo, &mut transport, &options).await.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.found, 2);
        assert_eq!(repo.count().unwrap(), 2);

        // Unchanged source, unchanged store: nothing new.
        let second = run_sync(&repo, &mut transport, &options).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.found, second.skipped);
    }

    #[tokio::test]
    async fn changed_status_updates_in_place() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let first_batch = outcome(vec![record("SEL-1", "sistema de gestion")]);
        let mut changed = record("SEL-1", "sistema de gestion");
        changed.status = "Adjudicado".to_string();
        let second_batch = outcome(vec![changed]);

        let mut transport =
            CannedTransport::new(vec![Ok(first_batch), Ok(second_batch)]);
        let options = single_keyword_options();

        run_sync(&repo, &mut transport, &options).await.unwrap();
        let second = run_sync(&repo, &mut transport, &options).await.unwrap();
        assert_eq!(second.updated, 1);
        assert_eq!(second.created, 0);

        let stored = repo.find_by_process_number("SEL-1").unwrap().unwrap();
        assert_eq!(stored.status, "Adjudicado");
    }

    #[tokio::test]
    async fn duplicate_across_keywords_is_merged() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let mut transport = CannedTransport::repeating(outcome(vec![record(
            "SEL-1",
            "software de contabilidad",
        )]));
        let options = SyncOptions {
            keywords: vec!["software".into(), "sistema".into()],
            ..Default::default()
        };

        let stats = run_sync(&repo, &mut transport, &options).await.unwrap();
        // Seen twice, persisted once.
        assert_eq!(stats.found, 2);
        assert_eq!(stats.created, 1);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_relevance_records_are_filtered() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let mut transport = CannedTransport::repeating(outcome(vec![record(
            "SEL-9",
            "adquisicion de cemento",
        )]));
        let options = single_keyword_options();

        let stats = run_sync(&repo, &mut transport, &options).await.unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn keyless_records_cannot_be_synced() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let mut transport =
            CannedTransport::repeating(outcome(vec![record("", "sistema sin numero")]));
        let options = single_keyword_options();

        let stats = run_sync(&repo, &mut transport, &options).await.unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn form_state_failure_aborts_run() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let mut transport = CannedTransport::new(vec![Err(ScrapeError::FormState(
            "no view state".into(),
        ))]);
        let options = single_keyword_options();

        let result = run_sync(&repo, &mut transport, &options).await;
        assert!(matches!(result, Err(ScrapeError::FormState(_))));
        // Aborted runs must not advance the incremental window.
        assert!(repo.last_sync().unwrap().is_none());
    }

    #[tokio::test]
    async fn transport_failure_for_one_keyword_does_not_abort() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let mut transport = CannedTransport::new(vec![
            Err(ScrapeError::Transport("HTTP 503".into())),
            Ok(outcome(vec![record("SEL-1", "sistema de planillas")])),
        ]);
        let options = SyncOptions {
            keywords: vec!["software".into(), "sistema".into()],
            ..Default::default()
        };

        let stats = run_sync(&repo, &mut transport, &options).await.unwrap();
        assert_eq!(stats.created, 1);
    }

    #[tokio::test]
    async fn successful_run_records_last_sync() {
        let repo = ProcessRepository::open_in_memory().unwrap();
        let mut transport =
            CannedTransport::repeating(outcome(vec![record("SEL-1", "sistema")]));
        let options = single_keyword_options();

        assert!(repo.last_sync().unwrap().is_none());
        run_sync(&repo, &mut transport, &options).await.unwrap();
        assert!(repo.last_sync().unwrap().is_some());
    }

    #[test]
    fn window_defaults_to_fixed_lookback() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let (from, to) = sync_window(None, None, today);
        assert_eq!(to, today);
        assert_eq!(from, today - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS));
    }

    #[test]
    fn window_resumes_from_last_sync() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let last = DateTime::parse_from_rfc3339("2024-06-20T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (from, _) = sync_window(Some(last), None, today);
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 6, 20).unwrap());
    }

    #[test]
    fn full_sync_window_uses_caller_days() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let (from, _) = sync_window(None, Some(7), today);
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 6, 23).unwrap());
    }

    #[test]
    fn window_start_never_exceeds_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let future = DateTime::parse_from_rfc3339("2024-07-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let (from, to) = sync_window(Some(future), None, today);
        assert!(from <= to);
    }
}
