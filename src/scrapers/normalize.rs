//! Tolerant normalization of raw table-cell text.
//!
//! The portal emits free-form Spanish-locale text: `12/03/2024` dates,
//! `S/ 1,234.56` amounts, and `---` placeholders. Every function here is
//! total; unparseable input becomes `None`, never an error and never zero.

use chrono::NaiveDate;

use crate::models::DEFAULT_CURRENCY;

/// Cells the portal uses to mean "no value".
const EMPTY_PLACEHOLDER: &str = "---";

/// Collapse runs of whitespace (including NBSP) into single spaces and trim.
pub fn clean_text(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a day/month/year date cell. Anything else is `None`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let cleaned = clean_text(text);
    // Dates sometimes arrive with a trailing time portion; keep the date part.
    let date_part = cleaned.split(' ').next()?;
    NaiveDate::parse_from_str(date_part, "%d/%m/%Y").ok()
}

/// Parse a numeric amount out of a currency cell.
///
/// Strips currency markers and thousands separators (commas). Placeholder
/// cells (`---`, empty) are `None`; the distinction between "no value" and
/// zero matters downstream.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() || cleaned == EMPTY_PLACEHOLDER {
        return None;
    }

    let numeric: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let numeric = numeric.replace(',', "");
    if !numeric.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    numeric.parse::<f64>().ok()
}

/// Infer a currency code from markers inside the cell text.
pub fn detect_currency(text: &str) -> Option<&'static str> {
    let cleaned = clean_text(text);
    if cleaned.contains("S/") || cleaned.contains("PEN") {
        Some("PEN")
    } else if cleaned.contains("USD") || cleaned.contains('$') {
        Some("USD")
    } else if cleaned.contains("EUR") || cleaned.contains('€') {
        Some("EUR")
    } else {
        None
    }
}

/// Currency code with the domestic default applied.
pub fn currency_or_default(text: &str) -> &'static str {
    detect_currency(text).unwrap_or(DEFAULT_CURRENCY)
}
