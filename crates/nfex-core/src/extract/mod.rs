//! NF-e field extraction.
//!
//! Turns the text of one NF-e document into a single header [`Record`] and
//! an ordered list of line-item records. The only fatal condition is
//! malformed XML; anything structurally missing degrades to omitted keys
//! (absent blocks) or the `"0"` sentinel (absent leaves).

pub mod schema;
pub mod uf;

use chrono::{DateTime, Utc};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::record::{Extraction, Record};
use crate::xml::{Document, Element};

use schema::{BlockSpec, FieldSpec, Lookup, Transform};

/// Namespace of every NF-e element.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Value reported for any field that could not be located.
pub const DEFAULT_VALUE: &str = "0";

/// Core information block, searched anywhere under the root.
const INFO_BLOCK: &str = "infNFe";

/// Extraction with diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    /// Extracted header and line items.
    pub extraction: Extraction,
    /// Header blocks that were not present in the document.
    pub missing_blocks: Vec<String>,
    /// Non-fatal findings about the document structure.
    pub warnings: Vec<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Table-driven NF-e extractor. Holds no state across calls.
#[derive(Debug, Clone)]
pub struct NfeExtractor {
    namespace: String,
}

impl NfeExtractor {
    /// Create an extractor for the standard NF-e namespace.
    pub fn new() -> Self {
        Self {
            namespace: NFE_NAMESPACE.to_string(),
        }
    }

    /// Use a different namespace URI (e.g. for test or homologation layouts).
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Extract the header and line items from an NF-e document.
    pub fn extract(&self, xml: &str) -> Result<Extraction> {
        self.extract_with_report(xml).map(|r| r.extraction)
    }

    /// Extract and also report which parts of the document were missing.
    pub fn extract_with_report(&self, xml: &str) -> Result<ExtractionReport> {
        let start = Utc::now();
        let document = Document::parse(xml)?;

        let mut warnings = Vec::new();
        let mut missing_blocks = Vec::new();

        let ns = self.namespace.as_str();
        let root = document.root();
        let info = if root.is(ns, INFO_BLOCK) {
            Some(root)
        } else {
            root.descendant(ns, INFO_BLOCK)
        };

        let Some(info) = info else {
            warn!("Document has no <{}> block; returning empty extraction", INFO_BLOCK);
            warnings.push(format!("No <{}> element found", INFO_BLOCK));
            return Ok(ExtractionReport {
                extraction: Extraction::default(),
                missing_blocks: schema::HEADER_BLOCKS.iter().map(|b| b.name.to_string()).collect(),
                warnings,
                processing_time_ms: elapsed_ms(start),
            });
        };

        let mut header = Record::new();
        for block in schema::HEADER_BLOCKS {
            match self.scope(info, block) {
                Some(scope) => self.read_block(scope, block, &mut header),
                None => {
                    debug!("Block '{}' ({}) not present", block.name, block.scope);
                    missing_blocks.push(block.name.to_string());
                }
            }
        }

        let items = self.read_items(info, &mut warnings);

        info!(
            "Extracted NF-e header with {} fields and {} line items",
            header.len(),
            items.len()
        );

        Ok(ExtractionReport {
            extraction: Extraction { header, items },
            missing_blocks,
            warnings,
            processing_time_ms: elapsed_ms(start),
        })
    }

    fn read_items(&self, info: &Element, warnings: &mut Vec<String>) -> Vec<Record> {
        let ns = self.namespace.as_str();
        let mut items = Vec::new();

        for (position, det) in info.children(ns, schema::ITEM_ELEMENT).enumerate() {
            let Some(prod) = self.scope(det, &schema::PRODUCT_BLOCK) else {
                warnings.push(format!("Line item at position {} has no product block", position + 1));
                continue;
            };

            let mut item = Record::new();
            item.insert(
                schema::ITEM_INDEX_LABEL,
                det.attr(schema::ITEM_INDEX_ATTR).unwrap_or(DEFAULT_VALUE),
            );
            self.read_block(prod, &schema::PRODUCT_BLOCK, &mut item);

            if let Some(taxes) = self.scope(det, &schema::ITEM_TAX_BLOCK) {
                self.read_block(taxes, &schema::ITEM_TAX_BLOCK, &mut item);
            }

            items.push(item);
        }

        items
    }

    fn scope<'a>(&self, parent: &'a Element, block: &BlockSpec) -> Option<&'a Element> {
        self.locate(parent, block.scope, block.scope_lookup)
    }

    fn locate<'a>(&self, parent: &'a Element, path: &str, lookup: Lookup) -> Option<&'a Element> {
        let ns = self.namespace.as_str();
        match lookup {
            Lookup::Child => parent.find(ns, path),
            Lookup::Descendant => parent.descendant(ns, path),
        }
    }

    fn read_block(&self, scope: &Element, block: &BlockSpec, record: &mut Record) {
        for spec in block.fields {
            record.insert(spec.label, self.read_field(scope, spec));
        }
    }

    fn read_field(&self, scope: &Element, spec: &FieldSpec) -> String {
        let raw = self
            .locate(scope, spec.path, spec.lookup)
            .map(Element::text)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_VALUE);

        match spec.transform {
            Transform::StateAbbreviation if raw != DEFAULT_VALUE => {
                uf::to_abbreviation(raw).into_owned()
            }
            _ => raw.to_string(),
        }
    }
}

impl Default for NfeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

// `Instant` is unavailable on wasm32-unknown-unknown.
fn elapsed_ms(start: DateTime<Utc>) -> u64 {
    (Utc::now() - start).num_milliseconds().max(0) as u64
}

/// Extract an NF-e document using the standard namespace.
pub fn extract_nfe(xml: &str) -> Result<Extraction> {
    NfeExtractor::new().extract(xml)
}
