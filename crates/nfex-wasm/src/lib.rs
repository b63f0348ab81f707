//! WASM bindings for Brazilian NF-e extraction.
//!
//! The browser reads the uploaded XML file and hands its text to these
//! functions; results come back as plain JavaScript objects.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use nfex_core::extract::uf;
use nfex_core::{Extraction, Record, Table};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    // Plain objects instead of `Map`s.
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value
        .serialize(&serializer)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Extract `{header, items}` from NF-e XML text.
#[wasm_bindgen]
pub fn extract_nfe(xml: &str) -> Result<JsValue, JsValue> {
    let extraction = nfex_core::extract_nfe(xml).map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_js(&extraction)
}

/// Two-letter state abbreviation for an IBGE state code, if known.
#[wasm_bindgen]
pub fn state_abbreviation(code: &str) -> Option<String> {
    uf::abbreviation(code).map(str::to_string)
}

/// Rows ready for an HTML table.
#[derive(Serialize)]
struct TableView {
    header: Table,
    items: Table,
}

impl TableView {
    fn new(extraction: &Extraction) -> Self {
        Self {
            header: Table::transposed(&extraction.header),
            items: Table::from_records(&extraction.items),
        }
    }
}

/// NF-e extractor class for browser use.
#[wasm_bindgen]
pub struct NfeExtractor {
    inner: nfex_core::NfeExtractor,
}

#[wasm_bindgen]
impl NfeExtractor {
    /// Create a new extractor for the standard NF-e namespace.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            inner: nfex_core::NfeExtractor::new(),
        }
    }

    /// Use a different namespace URI.
    #[wasm_bindgen]
    pub fn set_namespace(&mut self, namespace: &str) {
        self.inner = nfex_core::NfeExtractor::new().with_namespace(namespace);
    }

    /// Extract `{header, items}`.
    #[wasm_bindgen]
    pub fn extract(&self, xml: &str) -> Result<JsValue, JsValue> {
        let extraction = self
            .inner
            .extract(xml)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&extraction)
    }

    /// Extraction plus missing blocks, warnings and timing.
    #[wasm_bindgen]
    pub fn extract_with_report(&self, xml: &str) -> Result<JsValue, JsValue> {
        let report = self
            .inner
            .extract_with_report(xml)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        for warning in &report.warnings {
            web_sys::console::warn_1(&JsValue::from_str(warning));
        }
        to_js(&report)
    }

    /// Header as field/value rows and items as a filled rectangular table.
    #[wasm_bindgen]
    pub fn extract_tables(&self, xml: &str) -> Result<JsValue, JsValue> {
        let extraction = self
            .inner
            .extract(xml)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&TableView::new(&extraction))
    }
}

impl Default for NfeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Field value, or the sentinel when absent.
fn field<'a>(record: &'a Record, key: &str) -> &'a str {
    record.get(key).unwrap_or(nfex_core::DEFAULT_VALUE)
}

/// Header summary line, e.g. for a page title.
#[wasm_bindgen]
pub fn describe(xml: &str) -> Result<String, JsValue> {
    let extraction = nfex_core::extract_nfe(xml).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let header = &extraction.header;
    Ok(format!(
        "NF-e {} série {} - {} ({} itens)",
        field(header, "Número NF"),
        field(header, "Série"),
        field(header, "Emitente Nome"),
        extraction.items.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    const NFE: &str = r#"<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe"><NFe><infNFe>
        <ide><cUF>35</cUF><nNF>77</nNF><serie>2</serie></ide>
        <emit><xNome>Loja Teste</xNome></emit>
        <det nItem="1"><prod><cProd>X</cProd></prod></det>
    </infNFe></NFe></nfeProc>"#;

    #[wasm_bindgen_test]
    fn test_state_abbreviation() {
        assert_eq!(state_abbreviation("35").as_deref(), Some("SP"));
        assert_eq!(state_abbreviation("99"), None);
    }

    #[wasm_bindgen_test]
    fn test_describe() {
        assert_eq!(describe(NFE).unwrap(), "NF-e 77 série 2 - Loja Teste (1 itens)");
    }

    #[wasm_bindgen_test]
    fn test_extract_returns_object() {
        let value = extract_nfe(NFE).unwrap();
        assert!(value.is_object());
        assert!(extract_nfe("<nfeProc>").is_err());
    }

    #[wasm_bindgen_test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
