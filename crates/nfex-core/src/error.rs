//! Error types for the nfex-core library.

use thiserror::Error;

/// Main error type for the nfex library.
#[derive(Error, Debug)]
pub enum NfexError {
    /// The input is not well-formed XML.
    #[error("XML parse error: {0}")]
    Parse(#[from] ParseError),

    /// Field protection error.
    #[cfg(feature = "protect")]
    #[error("protection error: {0}")]
    Protect(#[from] ProtectError),

    /// Analysis pipeline error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Table rendering error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value outside its accepted range.
    #[error("invalid configuration: {key}: {reason}")]
    Config { key: String, reason: String },
}

/// Fatal XML failures. Structural absence inside a well-formed document is
/// never reported here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The underlying reader rejected the input.
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// An end tag did not close the innermost open element.
    #[error("unexpected closing tag </{found}> at byte {position}")]
    UnexpectedEnd { found: String, position: u64 },

    /// Input ended while elements were still open.
    #[error("unclosed element <{0}> at end of input")]
    Unclosed(String),

    /// A second top-level element was found.
    #[error("multiple root elements: <{0}>")]
    MultipleRoots(String),

    /// The input contained no element at all.
    #[error("document has no root element")]
    NoRoot,
}

/// Errors related to selective field protection.
#[cfg(feature = "protect")]
#[derive(Error, Debug)]
pub enum ProtectError {
    /// The cipher could not be created or failed to encrypt.
    #[error("cipher failure: {0}")]
    Cipher(String),

    /// No key material was available.
    #[error("missing key: {0}")]
    MissingKey(String),
}

/// Errors related to the analysis pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The workflow has not reached the stage required to run.
    #[error("workflow not ready: {0}")]
    NotReady(String),

    /// An agent call failed outright.
    #[error("agent {stage} failed: {reason}")]
    Agent { stage: String, reason: String },

    /// The whole run exceeded its time budget.
    #[error("analysis timed out after {0}s")]
    Timeout(u64),
}

/// Result type for the nfex library.
pub type Result<T> = std::result::Result<T, NfexError>;
