//! Extracted tender process records.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Category;

/// Domestic currency assumed when a value cell carries no recognizable
/// currency marker.
pub const DEFAULT_CURRENCY: &str = "PEN";

/// One tender record extracted from the portal's result table.
///
/// Fields mirror what the result table exposes; anything the table omitted
/// or that failed tolerant parsing stays `None`/empty rather than aborting
/// the row. The header-keyed `raw_fields` map preserves every cell as seen,
/// so positional-mapping drift can be diagnosed after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProcess {
    /// External identifier (nomenclature) assigned by the portal. May be
    /// empty when extraction was partial.
    pub process_number: String,
    /// Contracting entity name.
    pub entity: String,
    /// Object-of-contract description.
    pub description: String,
    /// Selection process type.
    pub process_type: String,
    /// Process status as published.
    pub status: String,
    /// Publication date, when the cell parsed as day/month/year.
    pub published: Option<NaiveDate>,
    /// Reference value. `None` for placeholder cells, never zero.
    pub reference_value: Option<f64>,
    /// Currency code, `PEN` when no marker was recognized.
    pub currency: String,
    /// Link to the process detail page, when a row cell carried one.
    pub detail_url: Option<String>,
    /// When this record was extracted.
    pub extracted_at: DateTime<Utc>,
    /// Technology relevance score assigned by the classifier.
    pub relevance: u32,
    /// Category bucket, `None` until classified or when relevance is zero.
    #[serde(rename = "categoria_proyecto")]
    pub category: Option<Category>,
    /// Cells keyed by the table's own header text, kept for diagnostics.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub raw_fields: HashMap<String, String>,
}

impl Default for ExtractedProcess {
    fn default() -> Self {
        Self {
            process_number: String::new(),
            entity: String::new(),
            description: String::new(),
            process_type: String::new(),
            status: String::new(),
            published: None,
            reference_value: None,
            currency: DEFAULT_CURRENCY.to_string(),
            detail_url: None,
            extracted_at: Utc::now(),
            relevance: 0,
            category: None,
            raw_fields: HashMap::new(),
        }
    }
}

impl ExtractedProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record carrying none of {process number, entity, description} is
    /// unusable and must be discarded before reaching callers.
    pub fn is_valid(&self) -> bool {
        !self.process_number.trim().is_empty()
            || !self.entity.trim().is_empty()
            || !self.description.trim().is_empty()
    }

    /// Rough completeness measure used to pick the better of two duplicate
    /// extractions of the same process.
    pub fn richness(&self) -> usize {
        let mut score = 0;
        for text in [
            &self.process_number,
            &self.entity,
            &self.description,
            &self.process_type,
            &self.status,
        ] {
            if !text.trim().is_empty() {
                score += 1;
            }
        }
        score += self.published.is_some() as usize;
        score += self.reference_value.is_some() as usize;
        score += self.detail_url.is_some() as usize;
        score + self.raw_fields.len()
    }
}
