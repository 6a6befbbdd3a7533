//! Plain-HTTP search transport speaking the portal's two-step protocol.
//!
//! The portal only answers searches from a session whose secondary tab has
//! been activated server-side. Step one replays a tab switch as a partial
//! request; step two submits the search against the refreshed state. The
//! exact field names of the active form cannot be known without rendering
//! the page, so criteria are written redundantly to every plausible
//! variant; unknown names are ignored upstream.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::models::SearchCriteria;
use crate::scrapers::form_state::FormState;
use crate::scrapers::http_client::PortalClient;
use crate::scrapers::parser::{parse_results, RESULTS_TABLE_ID};
use crate::scrapers::{resolve_detail_urls, SearchOutcome, SearchTransport};

/// Tab container holding the process-search pane.
pub const TAB_CONTAINER: &str = "tbBuscador";
/// Index of the process-search tab within the container.
const SEARCH_TAB_INDEX: &str = "1";
/// The search form inside the activated tab.
pub const SEARCH_FORM: &str = "tbBuscador:idFormBuscarProceso";
/// The search submit button.
pub const SEARCH_BUTTON: &str = "tbBuscador:idFormBuscarProceso:btnBuscarSelToken";

/// Candidate field names for the object-of-contract description.
const DESCRIPTION_FIELDS: &[&str] = &[
    "tbBuscador:idFormBuscarProceso:descripcionObjeto",
    "tbBuscador:idFormBuscarProceso:objetoContratacion",
    "descripcionObjeto",
    "objeto",
];

/// Candidate field names for the contracting entity.
const ENTITY_FIELDS: &[&str] = &[
    "tbBuscador:idFormBuscarProceso:nombreEntidad",
    "tbBuscador:idFormBuscarProceso:txtNombreEntidad",
];

/// Candidate field names for the process type.
const PROCESS_TYPE_FIELDS: &[&str] = &["tbBuscador:idFormBuscarProceso:numeroSeleccion"];

/// Candidate field names for the convocation year.
const YEAR_FIELDS: &[&str] = &[
    "tbBuscador:idFormBuscarProceso:anioConvocatoria_input",
    "tbBuscador:idFormBuscarProceso:anioConvocatoria",
];

/// Candidate field names for the publication date range.
const DATE_FROM_FIELDS: &[&str] = &[
    "tbBuscador:idFormBuscarProceso:fechaPublicacionDesde_input",
    "fechaPublicacionDesde",
];
const DATE_TO_FIELDS: &[&str] = &[
    "tbBuscador:idFormBuscarProceso:fechaPublicacionHasta_input",
    "fechaPublicacionHasta",
];

/// Build the partial-request body that simulates switching to the search tab.
pub fn tab_activation_form(state: &FormState) -> BTreeMap<String, String> {
    let mut form = state.fields().clone();
    form.insert("javax.faces.partial.ajax".into(), "true".into());
    form.insert("javax.faces.source".into(), TAB_CONTAINER.into());
    form.insert("javax.faces.partial.execute".into(), TAB_CONTAINER.into());
    form.insert("javax.faces.partial.render".into(), TAB_CONTAINER.into());
    form.insert(
        format!("{}_activeIndex", TAB_CONTAINER),
        SEARCH_TAB_INDEX.into(),
    );
    form.insert(format!("{}_contentLoad", TAB_CONTAINER), "true".into());
    form
}

/// Merge activated form state with search criteria into a submit body.
///
/// Criteria values land on every candidate field name; the submit button and
/// partial-request markers target the search action and results region.
pub fn search_form(state: &FormState, criteria: &SearchCriteria) -> BTreeMap<String, String> {
    let mut form = state.fields().clone();

    if let Some(ref keyword) = criteria.keyword {
        for field in DESCRIPTION_FIELDS {
            form.insert((*field).into(), keyword.clone());
        }
    }
    if let Some(ref entity) = criteria.entity {
        for field in ENTITY_FIELDS {
            form.insert((*field).into(), entity.clone());
        }
    }
    if let Some(ref process_type) = criteria.process_type {
        for field in PROCESS_TYPE_FIELDS {
            form.insert((*field).into(), process_type.clone());
        }
    }
    if let Some(year) = criteria.year {
        for field in YEAR_FIELDS {
            form.insert((*field).into(), year.to_string());
        }
    }
    if let Some(from) = criteria.date_from {
        for field in DATE_FROM_FIELDS {
            form.insert((*field).into(), from.format("%d/%m/%Y").to_string());
        }
    }
    if let Some(to) = criteria.date_to {
        for field in DATE_TO_FIELDS {
            form.insert((*field).into(), to.format("%d/%m/%Y").to_string());
        }
    }

    form.insert(SEARCH_BUTTON.into(), SEARCH_BUTTON.into());
    form.insert("javax.faces.partial.ajax".into(), "true".into());
    form.insert("javax.faces.source".into(), SEARCH_BUTTON.into());
    form.insert("javax.faces.partial.execute".into(), SEARCH_FORM.into());
    form.insert("javax.faces.partial.render".into(), RESULTS_TABLE_ID.into());
    form
}

/// Search transport driving the portal over plain HTTP.
pub struct HttpSearchTransport {
    client: PortalClient,
    search_url: String,
}

impl HttpSearchTransport {
    pub fn new(client: PortalClient, search_url: String) -> Self {
        Self { client, search_url }
    }

    /// Step one: activate the process-search tab.
    ///
    /// Fetches the page, echoes its state back with the tab-switch markers,
    /// then re-fetches and re-extracts. The second capture reflects the
    /// server's post-switch state and is the only one safe to submit with;
    /// reusing the pre-switch capture is a known failure mode.
    async fn activate(&self) -> Result<FormState> {
        debug!("activating process-search tab");
        let initial_html = self.client.get_text(&self.search_url).await?;
        let initial_state = FormState::extract(&initial_html);

        let activation = tab_activation_form(&initial_state);
        self.client.post_form(&self.search_url, &activation).await?;

        let refreshed_html = self.client.get_text(&self.search_url).await?;
        let refreshed_state = FormState::extract(&refreshed_html);

        if refreshed_state.is_empty() {
            return Err(ScrapeError::FormState(
                "no hidden fields captured after tab activation".into(),
            ));
        }

        debug!(
            "tab activated, {} state fields captured",
            refreshed_state.len()
        );
        Ok(refreshed_state)
    }
}

#[async_trait]
impl SearchTransport for HttpSearchTransport {
    fn method(&self) -> &'static str {
        "http"
    }

    async fn search(&mut self, criteria: &SearchCriteria) -> Result<SearchOutcome> {
        let state = self.activate().await?;

        let form = search_form(&state, criteria);
        info!(
            keyword = criteria.keyword.as_deref().unwrap_or(""),
            fields = form.len(),
            "submitting portal search"
        );
        let html = self.client.post_form(&self.search_url, &form).await?;

        let parsed = parse_results(&html)?;
        let mut processes = parsed.processes;
        resolve_detail_urls(&mut processes, &self.search_url);
        Ok(SearchOutcome::new(processes, parsed.pagination, self.method()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn canned_state() -> FormState {
        FormState::extract(
            r#"
            <input type="hidden" name="javax.faces.ViewState" value="VS-1" />
            <input type="hidden" name="sessionMarker" value="m" />
            "#,
        )
    }

    #[test]
    fn activation_form_echoes_state_and_targets_tab() {
        let form = tab_activation_form(&canned_state());
        assert_eq!(form.get("javax.faces.ViewState").unwrap(), "VS-1");
        assert_eq!(form.get("sessionMarker").unwrap(), "m");
        assert_eq!(form.get("javax.faces.partial.ajax").unwrap(), "true");
        assert_eq!(form.get("javax.faces.source").unwrap(), TAB_CONTAINER);
        assert_eq!(form.get("tbBuscador_activeIndex").unwrap(), "1");
        assert_eq!(form.get("tbBuscador_contentLoad").unwrap(), "true");
    }

    #[test]
    fn search_form_writes_keyword_to_every_variant() {
        let criteria = SearchCriteria::new().with_keyword("software");
        let form = search_form(&canned_state(), &criteria);
        for field in DESCRIPTION_FIELDS {
            assert_eq!(form.get(*field).map(String::as_str), Some("software"));
        }
    }

    #[test]
    fn search_form_targets_button_and_results_region() {
        let form = search_form(&canned_state(), &SearchCriteria::new());
        assert_eq!(form.get(SEARCH_BUTTON).unwrap(), SEARCH_BUTTON);
        assert_eq!(form.get("javax.faces.source").unwrap(), SEARCH_BUTTON);
        assert_eq!(form.get("javax.faces.partial.execute").unwrap(), SEARCH_FORM);
        assert_eq!(
            form.get("javax.faces.partial.render").unwrap(),
            RESULTS_TABLE_ID
        );
        // Server state still echoed.
        assert_eq!(form.get("javax.faces.ViewState").unwrap(), "VS-1");
    }

    #[test]
    fn dates_are_formatted_for_the_portal_locale() {
        let criteria = SearchCriteria::new()
            .with_date_range(
                NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            )
            .unwrap();
        let form = search_form(&canned_state(), &criteria);
        assert_eq!(
            form.get(DATE_FROM_FIELDS[0]).map(String::as_str),
            Some("05/01/2024")
        );
        assert_eq!(
            form.get(DATE_TO_FIELDS[0]).map(String::as_str),
            Some("10/02/2024")
        );
    }

    #[test]
    fn absent_criteria_leave_no_filter_fields() {
        let form = search_form(&canned_state(), &SearchCriteria::new());
        for field in DESCRIPTION_FIELDS.iter().chain(ENTITY_FIELDS) {
            assert!(!form.contains_key(*field));
        }
    }

    #[test]
    fn year_lands_on_year_variants() {
        let criteria = SearchCriteria::new().with_year(2024);
        let form = search_form(&canned_state(), &criteria);
        for field in YEAR_FIELDS {
            assert_eq!(form.get(*field).map(String::as_str), Some("2024"));
        }
    }
}
