//! Hidden-form-state capture for the portal's stateful search form.
//!
//! The portal requires every request to echo back server-issued state: an
//! opaque view-state token, optionally a client window id, and whatever
//! other hidden inputs the page carries. State is captured fresh on each
//! navigation, consumed once, and never persisted; the upstream tokens are
//! single-use.

use std::collections::BTreeMap;

use scraper::{Html, Selector};

/// Name of the distinguished view-state token input.
pub const VIEW_STATE_FIELD: &str = "javax.faces.ViewState";
/// Name of the distinguished client-window input.
pub const CLIENT_WINDOW_FIELD: &str = "javax.faces.ClientWindow";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Everything needed to replay the portal's stateful form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    fields: BTreeMap<String, String>,
}

impl FormState {
    /// Capture form state from a page of HTML.
    ///
    /// Collects every hidden input, then re-reads the two distinguished
    /// fields by name and overwrites the generic entries, since the targeted
    /// lookup is authoritative when both exist. Total over any input: a page
    /// with no hidden fields yields an empty (but usable) state.
    pub fn extract(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut fields = BTreeMap::new();

        let hidden = selector(r#"input[type="hidden"]"#);
        for input in document.select(&hidden) {
            if let Some(name) = input.value().attr("name") {
                if name.is_empty() {
                    continue;
                }
                let value = input.value().attr("value").unwrap_or("");
                fields.insert(name.to_string(), value.to_string());
            }
        }

        for name in [VIEW_STATE_FIELD, CLIENT_WINDOW_FIELD] {
            let targeted = selector(&format!(r#"input[name="{}"]"#, name));
            if let Some(input) = document.select(&targeted).next() {
                let value = input.value().attr("value").unwrap_or("");
                fields.insert(name.to_string(), value.to_string());
            }
        }

        Self { fields }
    }

    pub fn view_state(&self) -> Option<&str> {
        self.fields.get(VIEW_STATE_FIELD).map(String::as_str)
    }

    pub fn client_window(&self) -> Option<&str> {
        self.fields.get(CLIENT_WINDOW_FIELD).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy the captured fields into a request form body.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Consume the state into an owned form body, enforcing single use.
    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }
}
