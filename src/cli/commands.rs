//! CLI commands implementation.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::ProgressBar;

use crate::config::{load_settings, Settings};
use crate::etl::{run_sync, SyncOptions};
use crate::llm::{tender_question_prompt, LlmClient};
use crate::models::{SearchCriteria, SyncStats};
use crate::repository::ProcessRepository;
use crate::scrapers::{
    BrowserSearchTransport, HttpSearchTransport, PortalClient, SearchTransport,
};

#[derive(Parser)]
#[command(name = "tenderscout")]
#[command(about = "Public procurement tender acquisition and monitoring")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Which transport drives the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Via {
    /// Raw HTTP form replay (cheap, default)
    Http,
    /// Headless-browser interaction (handles client-side rendering)
    Browser,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Sync tender records from the portal into the local store
    Sync {
        /// Full-sync lookback in days (default: incremental from last sync)
        #[arg(long)]
        days_back: Option<i64>,
        /// Search keywords (repeatable; default: technology sweep)
        #[arg(short, long)]
        keyword: Vec<String>,
        /// Convocation year (default: current year)
        #[arg(short, long)]
        year: Option<i32>,
        /// Transport to use
        #[arg(long, value_enum, default_value_t = Via::Http)]
        via: Via,
        /// Limit on default sweep keywords per run
        #[arg(long, default_value = "10")]
        max_keywords: usize,
        /// Also keep records with zero technology relevance
        #[arg(long)]
        all_records: bool,
    },

    /// Run a single portal search and print the results
    Search {
        /// Keyword for the object-of-contract description
        keyword: Option<String>,
        /// Contracting entity name
        #[arg(short, long)]
        entity: Option<String>,
        /// Convocation year
        #[arg(short, long)]
        year: Option<i32>,
        /// Result page
        #[arg(short, long, default_value = "1")]
        page: u32,
        /// Transport to use
        #[arg(long, value_enum, default_value_t = Via::Http)]
        via: Via,
    },

    /// Show local store statistics
    Stats,

    /// Ask the assistant a question about stored tenders
    Ask {
        /// Question, in natural language
        question: String,
    },
}

/// Parse arguments and dispatch.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Sync {
            days_back,
            keyword,
            year,
            via,
            max_keywords,
            all_records,
        } => {
            let options = SyncOptions {
                days_back,
                keywords: keyword,
                year,
                max_keywords,
                require_relevance: !all_records,
            };
            cmd_sync(&settings, via, options).await
        }
        Commands::Search {
            keyword,
            entity,
            year,
            page,
            via,
        } => cmd_search(&settings, via, keyword, entity, year, page).await,
        Commands::Stats => cmd_stats(&settings),
        Commands::Ask { question } => cmd_ask(&settings, &question).await,
    }
}

fn make_transport(via: Via, settings: &Settings) -> Box<dyn SearchTransport> {
    match via {
        Via::Http => {
            let client = PortalClient::new(
                settings.request_timeout(),
                settings.request_delay(),
                settings.retry_policy(),
            );
            Box::new(HttpSearchTransport::new(client, settings.search_url()))
        }
        Via::Browser => Box::new(BrowserSearchTransport::new(
            settings.browser.clone(),
            settings.search_url(),
        )),
    }
}

fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let path = settings.database_path();
    ProcessRepository::open(&path)?;
    println!(
        "{} store initialized at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

async fn cmd_sync(settings: &Settings, via: Via, options: SyncOptions) -> anyhow::Result<()> {
    let repo = ProcessRepository::open(&settings.database_path())?;
    let mut transport = make_transport(via, settings);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("syncing via {}...", transport.method()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = run_sync(&repo, transport.as_mut(), &options).await;
    // The transport session is scoped to this run; release it on every path.
    transport.close().await;
    spinner.finish_and_clear();

    let stats = result?;
    print_stats(&stats);
    Ok(())
}

async fn cmd_search(
    settings: &Settings,
    via: Via,
    keyword: Option<String>,
    entity: Option<String>,
    year: Option<i32>,
    page: u32,
) -> anyhow::Result<()> {
    let mut criteria = SearchCriteria::new().with_page(page);
    if let Some(keyword) = keyword {
        criteria = criteria.with_keyword(keyword);
    }
    if let Some(entity) = entity {
        criteria = criteria.with_entity(entity);
    }
    let year = year.unwrap_or_else(|| criteria.effective_year());
    criteria = criteria.with_year(year);

    let mut transport = make_transport(via, settings);
    let result = transport.search(&criteria).await;
    transport.close().await;
    let outcome = result?;

    println!(
        "{} {} processes via {} (page {}/{}{})",
        style("✓").green(),
        outcome.total_found,
        outcome.method,
        outcome.pagination.current_page,
        outcome.pagination.total_pages,
        if outcome.pagination.is_estimate {
            ", total estimated"
        } else {
            ""
        }
    );

    for p in &outcome.processes {
        let value = p
            .reference_value
            .map(|v| format!("{} {:.2}", p.currency, v))
            .unwrap_or_else(|| "—".to_string());
        println!(
            "  {}  {}  {}  {}",
            style(&p.process_number).cyan(),
            truncate(&p.entity, 32),
            truncate(&p.description, 48),
            value
        );
    }
    Ok(())
}

fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    let repo = ProcessRepository::open(&settings.database_path())?;

    println!("{} stored processes", repo.count()?);
    match repo.last_sync()? {
        Some(ts) => println!("last sync: {}", ts.to_rfc3339()),
        None => println!("last sync: never"),
    }

    println!("\nBy category:");
    for (category, count) in repo.category_counts()? {
        println!("  {:>5}  {}", count, category);
    }
    Ok(())
}

async fn cmd_ask(settings: &Settings, question: &str) -> anyhow::Result<()> {
    let repo = ProcessRepository::open(&settings.database_path())?;
    let client = LlmClient::new(settings.llm.clone());

    if !client.is_available().await {
        anyhow::bail!(
            "assistant endpoint {} is not reachable; is the model server running?",
            client.config().endpoint
        );
    }

    let recent = repo.recent(25)?;
    if recent.is_empty() {
        anyhow::bail!("no stored processes yet; run `tender sync` first");
    }

    let prompt = tender_question_prompt(question, &recent);
    let answer = client.generate(&prompt).await?;
    println!("{}", answer);
    Ok(())
}

fn print_stats(stats: &SyncStats) {
    println!("{} sync finished", style("✓").green());
    println!("  found:   {}", stats.found);
    println!("  created: {}", style(stats.created).green());
    println!("  updated: {}", style(stats.updated).yellow());
    println!("  skipped: {}", stats.skipped);
    if stats.errored > 0 {
        println!("  errored: {}", style(stats.errored).red());
    }
    if let Some(secs) = stats.duration_secs() {
        println!("  took {}s", secs);
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("hola", 10), "hola");
    }

    #[test]
    fn truncate_cuts_on_char_boundaries() {
        let cut = truncate("construcción de infraestructura", 12);
        assert!(cut.chars().count() <= 12);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn cli_parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "tenderscout",
            "sync",
            "--days-back",
            "7",
            "--via",
            "browser",
            "-k",
            "software",
        ])
        .unwrap();
        match cli.command {
            Commands::Sync {
                days_back,
                via,
                keyword,
                ..
            } => {
                assert_eq!(days_back, Some(7));
                assert_eq!(via, Via::Browser);
                assert_eq!(keyword, vec!["software".to_string()]);
            }
            _ => panic!("expected sync command"),
        }
    }
}
