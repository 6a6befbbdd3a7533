//! Locator candidates and the small interpreter that turns them into DOM
//! probes.
//!
//! The portal's form controls have no stable ids, so every control is
//! described by an ordered candidate list tried in sequence with
//! first-success-wins semantics. Candidates are data, not control flow:
//! adding a new one means appending to a table. Each action compiles into
//! one JavaScript expression evaluated in the page, returning whether any
//! visible, enabled candidate accepted the action.

/// One way of finding an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// Exact element id.
    Id(&'static str),
    /// CSS selector.
    Css(&'static str),
    /// First element of the given tag whose text contains the given string.
    Text(&'static str, &'static str),
}

impl Locator {
    /// JavaScript arrow function evaluating to the element or null.
    fn finder_js(&self) -> String {
        match self {
            Self::Id(id) => format!("() => document.getElementById({})", js_str(id)),
            Self::Css(sel) => format!("() => document.querySelector({})", js_str(sel)),
            Self::Text(tag, text) => format!(
                "() => Array.from(document.querySelectorAll({})).find(el => (el.textContent || '').includes({})) || null",
                js_str(tag),
                js_str(text)
            ),
        }
    }
}

/// Quote a Rust string as a JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).expect("string serializes")
}

fn finder_array(candidates: &[Locator]) -> String {
    let finders: Vec<String> = candidates.iter().map(Locator::finder_js).collect();
    format!("[{}]", finders.join(", "))
}

/// Shared runner: try candidates in order, applying `action` to the first
/// visible, enabled element. `action` must `return true` on success or fall
/// through to let the next candidate try.
fn runner(candidates: &[Locator], action: &str) -> String {
    format!(
        r#"(() => {{
    const finders = {finders};
    for (const find of finders) {{
        let el = null;
        try {{ el = find(); }} catch (e) {{ el = null; }}
        if (!el) continue;
        if (el.offsetParent === null || el.disabled) continue;
        {action}
    }}
    return false;
}})()"#,
        finders = finder_array(candidates),
        action = action
    )
}

/// Script that clicks the first resolvable candidate.
pub fn click_script(candidates: &[Locator]) -> String {
    runner(candidates, "el.click(); return true;")
}

/// Script that fills the first resolvable candidate with a value and fires
/// the input/change events the page's widgets listen for.
pub fn fill_script(candidates: &[Locator], value: &str) -> String {
    let action = format!(
        r#"el.value = {value};
        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return true;"#,
        value = js_str(value)
    );
    runner(candidates, &action)
}

/// Script that selects a dropdown option by visible label, falling back to
/// selection by underlying value among known equivalent spellings. A
/// candidate whose option list matches nothing falls through to the next.
pub fn select_script(candidates: &[Locator], labels: &[&str], values: &[&str]) -> String {
    let labels_js: Vec<String> = labels.iter().map(|l| js_str(l)).collect();
    let values_js: Vec<String> = values.iter().map(|v| js_str(v)).collect();
    let action = format!(
        r#"const labels = [{labels}];
        const values = [{values}];
        const options = Array.from(el.options || []);
        let idx = options.findIndex(o => labels.includes(o.text.trim()));
        if (idx < 0) idx = options.findIndex(o => values.includes(o.value));
        if (idx >= 0) {{
            el.selectedIndex = idx;
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }}"#,
        labels = labels_js.join(", "),
        values = values_js.join(", ")
    );
    runner(candidates, &action)
}

/// Candidates for the process-search tab control.
pub const TAB_CANDIDATES: &[Locator] = &[
    Locator::Text("a", "Procedimientos de Selección"),
    Locator::Text("li", "Procedimientos de Selección"),
    Locator::Text("span", "Procedimientos de Selección"),
    Locator::Css("li.ui-tabs-tab:nth-child(2) a"),
];

/// Candidates for the object-of-contract dropdown (a mandatory filter).
pub const CONTRACT_OBJECT_CANDIDATES: &[Locator] = &[
    Locator::Id("tbBuscador:idFormBuscarProceso:j_idt234_input"),
    Locator::Id("tbBuscador:idFormBuscarProceso:objetoContratacion"),
    Locator::Id("objetoContratacion"),
    Locator::Css(r#"select[name*="objetoContratacion"]"#),
    Locator::Css(r#"select[id*="objetoContratacion"]"#),
];

/// Known spellings of the "service" contract-object option.
pub const SERVICE_OPTION_LABELS: &[&str] = &["Servicio", "SERVICIO", "servicio"];
pub const SERVICE_OPTION_VALUES: &[&str] = &["Servicio", "SERVICIO", "servicio", "4"];

/// Candidates for the convocation-year dropdown (a mandatory filter).
pub const YEAR_CANDIDATES: &[Locator] = &[
    Locator::Id("tbBuscador:idFormBuscarProceso:anioConvocatoria_input"),
    Locator::Id("tbBuscador:idFormBuscarProceso:anioConvocatoria"),
    Locator::Id("anioConvocatoria"),
    Locator::Css(r#"select[name*="anioConvocatoria"]"#),
    Locator::Css(r#"select[id*="anio"]"#),
];

/// Candidates for the publication date range boxes.
pub const DATE_FROM_CANDIDATES: &[Locator] = &[
    Locator::Id("tbBuscador:idFormBuscarProceso:fechaPublicacionDesde_input"),
    Locator::Id("fechaPublicacionDesde"),
    Locator::Css(r#"input[name*="fechaPublicacionDesde"]"#),
    Locator::Css(r#"input[id*="fechaDesde"]"#),
];
pub const DATE_TO_CANDIDATES: &[Locator] = &[
    Locator::Id("tbBuscador:idFormBuscarProceso:fechaPublicacionHasta_input"),
    Locator::Id("fechaPublicacionHasta"),
    Locator::Css(r#"input[name*="fechaPublicacionHasta"]"#),
    Locator::Css(r#"input[id*="fechaHasta"]"#),
];

/// Candidates for the object-description text box.
pub const DESCRIPTION_CANDIDATES: &[Locator] = &[
    Locator::Id("tbBuscador:idFormBuscarProceso:descripcionObjeto"),
    Locator::Id("descripcionObjeto"),
    Locator::Css(r#"input[placeholder="Descripción del Objeto"]"#),
    Locator::Css(r#"input[name*="descripcion"]"#),
];

/// Candidates for the entity-name text box.
pub const ENTITY_CANDIDATES: &[Locator] = &[
    Locator::Id("tbBuscador:idFormBuscarProceso:nombreEntidad"),
    Locator::Id("nombreEntidad"),
    Locator::Css(r#"input[name*="nombreEntidad"]"#),
];

/// Candidates for the search submit control.
pub const SEARCH_BUTTON_CANDIDATES: &[Locator] = &[
    Locator::Id("tbBuscador:idFormBuscarProceso:btnBuscarSelToken"),
    Locator::Text("button", "Buscar"),
    Locator::Css(r#"input[value="Buscar"]"#),
    Locator::Css(r#"button[class*="btnBuscar"]"#),
];
