//! Core library for Brazilian electronic invoice (NF-e) processing.
//!
//! This crate provides:
//! - A namespace-aware XML element tree built on `quick-xml`
//! - Table-driven extraction of the NF-e header and line items
//! - Export of an extraction as a revised `<nfe_revisada>` XML document
//! - Selective protection of sensitive fields before external analysis
//! - Typed workflow state and sequential orchestration of analysis agents

pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
#[cfg(feature = "protect")]
pub mod protect;
pub mod xml;

pub use error::{NfexError, ParseError, Result};
pub use extract::{extract_nfe, ExtractionReport, NfeExtractor, DEFAULT_VALUE, NFE_NAMESPACE};
pub use models::record::{Extraction, Record};
pub use models::table::Table;
pub use models::workflow::WorkflowState;
pub use xml::write_revised;
pub use pipeline::{AnalysisAgent, AnalysisStage, Orchestrator, StepReport, StepStatus};
#[cfg(feature = "protect")]
pub use protect::{FieldProtector, SelectiveProtector};
