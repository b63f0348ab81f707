//! CLI commands and the output helpers they share.

pub mod analyze;
pub mod batch;
pub mod config;
pub mod extract;
pub mod protect;

use std::path::Path;

use nfex_core::models::config::NfexConfig;
use chrono::Utc;
use nfex_core::{Extraction, NfeExtractor, Table, write_revised};

/// Output format for extracted documents.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON object with `header` and `items`
    Json,
    /// Header row, blank line, then the item rows
    Csv,
    /// Plain text summary
    Text,
    /// Revised NF-e document (`<nfe_revisada>`)
    Xml,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
            OutputFormat::Xml => "xml",
        }
    }
}

/// Load the configuration from `--config`, the default location, or built-in defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<NfexConfig> {
    let default_path = config::default_config_path();
    let config = match config_path {
        Some(path) => NfexConfig::from_file(Path::new(path))?,
        None if default_path.exists() => NfexConfig::from_file(&default_path)?,
        None => NfexConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

pub fn extractor(config: &NfexConfig) -> NfeExtractor {
    NfeExtractor::new().with_namespace(config.extraction.namespace.clone())
}

/// Render an extraction. `source` names the input file in formats that record it.
pub fn format_extraction(
    extraction: &Extraction,
    source: &str,
    format: OutputFormat,
    config: &NfexConfig,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            if config.output.pretty_json {
                Ok(serde_json::to_string_pretty(extraction)?)
            } else {
                Ok(serde_json::to_string(extraction)?)
            }
        }
        OutputFormat::Csv => format_csv(extraction, config.output.delimiter_byte()),
        OutputFormat::Text => Ok(format_text(extraction)),
        OutputFormat::Xml => Ok(write_revised(extraction, source, Utc::now())?),
    }
}

fn format_csv(extraction: &Extraction, delimiter: u8) -> anyhow::Result<String> {
    let header = Table::from_records([&extraction.header]).to_csv_string(delimiter)?;
    let items = Table::from_records(&extraction.items).to_csv_string(delimiter)?;
    Ok(format!("{header}\n{items}"))
}

fn format_text(extraction: &Extraction) -> String {
    let mut output = String::new();

    output.push_str("Header:\n");
    let width = extraction.header.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    for (key, value) in extraction.header.iter() {
        let pad = width - key.chars().count();
        output.push_str(&format!("  {key}{}  {value}\n", " ".repeat(pad)));
    }

    output.push_str(&format!("\nItems ({}):\n", extraction.items.len()));
    for item in &extraction.items {
        let line: Vec<String> = item.iter().map(|(k, v)| format!("{k}={v}")).collect();
        output.push_str(&format!("  {}\n", line.join(", ")));
    }

    output
}
