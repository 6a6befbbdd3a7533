//! Keyword-driven technology relevance scoring and categorization.
//!
//! Pure and total: every input text yields a deterministic
//! (relevance, category) pair and nothing here can fail. Matching is plain
//! substring containment over lowercased text, which is what the portal's
//! free-form Spanish descriptions respond best to.

use serde::{Deserialize, Serialize};

use crate::models::ExtractedProcess;

/// Phrases strongly tied to technology procurement. Each match adds 2.
const PRIMARY_KEYWORDS: &[&str] = &[
    "sistema informático",
    "software",
    "aplicación web",
    "desarrollo de software",
    "tecnología información",
    "base de datos",
    "plataforma digital",
    "infraestructura tecnológica",
    "soporte técnico",
    "mantenimiento sistema",
];

/// Broader terms that co-occur with technology tenders. Each match adds 1.
const SECONDARY_KEYWORDS: &[&str] = &[
    "software",
    "sistema",
    "informática",
    "digital",
    "web",
    "base",
    "datos",
    "tecnología",
];

/// Category buckets, ordered by assignment priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SoftwareDevelopment,
    SupportMaintenance,
    Database,
    Web,
    Infrastructure,
    Licensing,
    /// Fallback for relevant records no specific bucket claimed.
    InformationSystems,
}

impl Category {
    /// Label stored and exposed downstream.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoftwareDevelopment => "Desarrollo de Software",
            Self::SupportMaintenance => "Soporte y Mantenimiento",
            Self::Database => "Base de Datos",
            Self::Web => "Desarrollo Web",
            Self::Infrastructure => "Infraestructura TI",
            Self::Licensing => "Licencias de Software",
            Self::InformationSystems => "Sistemas de Información",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Desarrollo de Software" => Some(Self::SoftwareDevelopment),
            "Soporte y Mantenimiento" => Some(Self::SupportMaintenance),
            "Base de Datos" => Some(Self::Database),
            "Desarrollo Web" => Some(Self::Web),
            "Infraestructura TI" => Some(Self::Infrastructure),
            "Licencias de Software" => Some(Self::Licensing),
            "Sistemas de Información" => Some(Self::InformationSystems),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket trigger terms, tried in priority order; first hit wins.
const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (
        Category::SoftwareDevelopment,
        &["desarrollo", "programación", "código"],
    ),
    (
        Category::SupportMaintenance,
        &["mantenimiento", "soporte", "mesa de ayuda"],
    ),
    (Category::Database, &["base de datos", "bd", "sql"]),
    (Category::Web, &["web", "portal", "sitio"]),
    (
        Category::Infrastructure,
        &["infraestructura", "red", "servidor"],
    ),
    (Category::Licensing, &["licencia", "software"]),
];

/// Score a lowercased text blob against both keyword sets.
pub fn relevance_score(text: &str) -> u32 {
    let mut score = 0;
    for term in PRIMARY_KEYWORDS {
        if text.contains(term) {
            score += 2;
        }
    }
    for term in SECONDARY_KEYWORDS {
        if text.contains(term) {
            score += 1;
        }
    }
    score
}

/// Assign a category bucket to a lowercased text blob.
///
/// Returns `None` when the text has zero relevance; the generic
/// `InformationSystems` bucket otherwise, unless a specific rule fires first.
pub fn categorize(text: &str, relevance: u32) -> Option<Category> {
    for (category, terms) in CATEGORY_RULES {
        if terms.iter().any(|t| text.contains(t)) {
            return Some(*category);
        }
    }
    if relevance > 0 {
        Some(Category::InformationSystems)
    } else {
        None
    }
}

/// Classify arbitrary text: lowercase once, then score and bucket it.
pub fn classify(text: &str) -> (u32, Option<Category>) {
    let lowered = text.to_lowercase();
    let relevance = relevance_score(&lowered);
    (relevance, categorize(&lowered, relevance))
}

/// Classify a record over its description and entity name, the two fields
/// that carry the signal on this portal.
pub fn classify_process(process: &ExtractedProcess) -> (u32, Option<Category>) {
    classify(&format!("{} {}", process.description, process.entity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_development_tender_is_relevant() {
        let (relevance, category) =
            classify("Desarrollo de sistema web para gestión documentaria");
        assert!(relevance >= 2);
        assert_eq!(category, Some(Category::SoftwareDevelopment));
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "Adquisición de licencias de software ofimático";
        assert_eq!(classify(text), classify(text));
    }

    #[test]
    fn primary_keywords_weigh_double() {
        // "desarrollo de software" (primary, +2) also contains the
        // secondary terms "software" (+1); primary "software" (+2).
        let (relevance, _) = classify("desarrollo de software");
        assert_eq!(relevance, 5);
    }

    #[test]
    fn unrelated_text_scores_zero_and_has_no_category() {
        let (relevance, category) = classify("Adquisición de cemento y agregados");
        assert_eq!(relevance, 0);
        assert_eq!(category, None);
    }

    #[test]
    fn priority_order_picks_first_matching_bucket() {
        // Contains both "mantenimiento" and "servidor"; support/maintenance
        // comes first in the rule table.
        let (_, category) = classify("mantenimiento de servidor central con sistema");
        assert_eq!(category, Some(Category::SupportMaintenance));
    }

    #[test]
    fn relevant_text_without_specific_bucket_falls_back() {
        // "datos" alone is relevant (+1) but triggers no bucket rule.
        let (relevance, category) = classify("procesamiento de datos censales");
        assert!(relevance > 0);
        assert_eq!(category, Some(Category::InformationSystems));
    }

    #[test]
    fn category_labels_round_trip() {
        for category in [
            Category::SoftwareDevelopment,
            Category::SupportMaintenance,
            Category::Database,
            Category::Web,
            Category::Infrastructure,
            Category::Licensing,
            Category::InformationSystems,
        ] {
            assert_eq!(Category::from_str(category.as_str()), Some(category));
        }
    }
}
