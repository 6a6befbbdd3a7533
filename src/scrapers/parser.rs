//! Result-table parsing for the portal's search response pages.
//!
//! The portal renders results as a PrimeFaces data table, but the markup
//! drifts between deployments and partial-render responses. Table location
//! therefore walks an ordered strategy list, and field extraction tolerates
//! missing cells, placeholder values, and unparseable text. Structural
//! absence (no table, no rows) is a valid zero-result outcome, not an error.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::classify::classify_process;
use crate::error::{Result, ScrapeError};
use crate::models::{ExtractedProcess, PaginationInfo};
use crate::scrapers::normalize::{clean_text, currency_or_default, parse_amount, parse_date};

/// Element id of the results table as deployed today.
pub const RESULTS_TABLE_ID: &str = "tbBuscador:idFormBuscarProceso:dtProcesos";

/// Class marking a PrimeFaces "no records" placeholder row.
const EMPTY_ROW_CLASS: &str = "ui-datatable-empty-message";

/// Rows with fewer cells than this are layout artifacts, not data.
const MIN_DATA_CELLS: usize = 3;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Everything parsed out of one result page.
#[derive(Debug, Clone, Default)]
pub struct ParsedResults {
    pub processes: Vec<ExtractedProcess>,
    pub pagination: PaginationInfo,
    /// Header texts in table order, for diagnostics.
    pub headers: Vec<String>,
}

/// Parse a search response page into normalized records plus pagination.
///
/// Fails only on catastrophic input (an empty/blank body); every structural
/// deficiency degrades to fewer or zero records.
pub fn parse_results(html: &str) -> Result<ParsedResults> {
    if html.trim().is_empty() {
        return Err(ScrapeError::Parse("empty response body".into()));
    }

    let document = Html::parse_document(html);

    let table = match locate_results_table(&document) {
        Some(table) => table,
        None => {
            debug!("no results table located by any strategy");
            return Ok(ParsedResults {
                processes: Vec::new(),
                pagination: PaginationInfo::none_found(),
                headers: Vec::new(),
            });
        }
    };

    let headers = extract_headers(table);
    let mut processes = Vec::new();

    for row in data_rows(table) {
        if is_empty_state_row(row) {
            debug!("skipping empty-state placeholder row");
            continue;
        }
        match extract_row(row, &headers) {
            Some(process) => processes.push(process),
            None => debug!("dropping row that failed the validity invariant"),
        }
    }

    let pagination = extract_pagination(&document, processes.len());
    Ok(ParsedResults {
        processes,
        pagination,
        headers,
    })
}

/// Locate the results table, first strategy wins:
/// 1. the exact known element id,
/// 2. a container with that id wrapping an inner table,
/// 3. any table styled as a data table,
/// 4. any table with both a header and a body section.
fn locate_results_table(document: &Html) -> Option<ElementRef<'_>> {
    let by_id = selector(&format!(r#"table[id="{}"]"#, RESULTS_TABLE_ID));
    if let Some(table) = document.select(&by_id).next() {
        debug!("results table found by exact id");
        return Some(table);
    }

    let container = selector(&format!(r#"div[id="{}"]"#, RESULTS_TABLE_ID));
    let inner_table = selector("table");
    if let Some(div) = document.select(&container).next() {
        if let Some(table) = div.select(&inner_table).next() {
            debug!("results table found inside container div");
            return Some(table);
        }
    }

    let by_class = selector(r#"table[class*="datatable"]"#);
    if let Some(table) = document.select(&by_class).next() {
        debug!("results table found by data-table class");
        return Some(table);
    }

    let thead = selector("thead");
    let tbody = selector("tbody");
    let any_table = selector("table");
    for table in document.select(&any_table) {
        if table.select(&thead).next().is_some() && table.select(&tbody).next().is_some() {
            debug!("results table found by thead/tbody structure");
            return Some(table);
        }
    }

    None
}

/// Header texts from the table's head section, in column order.
fn extract_headers(table: ElementRef<'_>) -> Vec<String> {
    let header_cells = selector("thead th, thead td");
    table
        .select(&header_cells)
        .map(|cell| clean_text(&cell.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Data rows within the located table body. Falls back to bare rows when
/// the table has no `tbody` wrapper.
fn data_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let body_rows = selector("tbody tr");
    let rows: Vec<_> = table.select(&body_rows).collect();
    if !rows.is_empty() {
        return rows;
    }

    let bare_rows = selector("tr");
    let data_cell = selector("td");
    table
        .select(&bare_rows)
        .filter(|row| row.select(&data_cell).next().is_some())
        .collect()
}

fn is_empty_state_row(row: ElementRef<'_>) -> bool {
    row.value()
        .attr("class")
        .map(|class| class.contains(EMPTY_ROW_CLASS))
        .unwrap_or(false)
}

/// Turn one table row into a record, or `None` when the row fails the
/// minimum-cell or validity invariant.
///
/// Column-to-field mapping is positional, per the observed table layout.
/// Every cell is also stored under its header text in `raw_fields` so
/// nothing is lost if the positional assumption drifts.
fn extract_row(row: ElementRef<'_>, headers: &[String]) -> Option<ExtractedProcess> {
    let cell_sel = selector("td, th");
    let cells: Vec<String> = row
        .select(&cell_sel)
        .map(|cell| clean_text(&cell.text().collect::<String>()))
        .collect();

    if cells.len() < MIN_DATA_CELLS {
        return None;
    }

    let mut process = ExtractedProcess::new();

    let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
    process.process_number = cell(0);
    process.entity = cell(1);
    process.description = cell(2);
    process.process_type = cell(3);
    process.status = cell(4);
    process.published = cells.get(5).and_then(|text| parse_date(text));
    if let Some(value_text) = cells.get(6) {
        process.reference_value = parse_amount(value_text);
        process.currency = currency_or_default(value_text).to_string();
    }

    for (i, text) in cells.iter().enumerate() {
        let key = headers
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("columna_{}", i));
        process.raw_fields.insert(key, text.clone());
    }

    let link = selector("a[href]");
    process.detail_url = row
        .select(&link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.to_string());

    if !process.is_valid() {
        return None;
    }

    let (relevance, category) = classify_process(&process);
    process.relevance = relevance;
    process.category = category;

    Some(process)
}

/// Pagination from a "<current> de <total>"-style paginator, falling back
/// to a single page sized by what was actually parsed.
fn extract_pagination(document: &Html, parsed_rows: usize) -> PaginationInfo {
    let current = selector("span.ui-paginator-current");
    let container = selector("div.ui-paginator");

    let text = document
        .select(&current)
        .next()
        .or_else(|| document.select(&container).next())
        .map(|el| clean_text(&el.text().collect::<String>()));

    if let Some(text) = text {
        let pattern = Regex::new(r"(\d+)\s*(?:de|of)\s*(\d+)").expect("static regex");
        if let Some(caps) = pattern.captures(&text) {
            let current_page = caps[1].parse().unwrap_or(1);
            let total_pages = caps[2].parse().unwrap_or(1);
            return PaginationInfo::estimated(current_page, total_pages);
        }
        warn!("paginator present but text {:?} did not match", text);
    }

    PaginationInfo::single_page(parsed_rows as u64)
}
