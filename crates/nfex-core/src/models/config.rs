//! Configuration structures for the extraction and analysis pipeline.

use serde::{Deserialize, Serialize};

use crate::NfexError;
use crate::extract::NFE_NAMESPACE;

/// Main configuration for nfex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfexConfig {
    /// Extraction configuration.
    pub extraction: ExtractionConfig,

    /// Sensitive field protection configuration.
    pub protection: ProtectionConfig,

    /// External analysis configuration.
    pub analysis: AnalysisConfig,

    /// Output configuration.
    pub output: OutputConfig,
}

/// Extractor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Namespace URI of NF-e elements.
    pub namespace: String,

    /// Log a warning for every header block missing from the document.
    pub warn_on_missing_blocks: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            namespace: NFE_NAMESPACE.to_string(),
            warn_on_missing_blocks: false,
        }
    }
}

/// Selective protection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Protect sensitive fields before they leave the process.
    pub enabled: bool,

    /// Environment variable holding the key passphrase.
    pub passphrase_env: String,

    /// Maximum length of a sanitized value before truncation.
    pub max_field_length: usize,

    /// Fields to encrypt. Empty means the built-in list.
    pub sensitive_fields: Vec<String>,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            passphrase_env: "NFEX_PASSPHRASE".to_string(),
            max_field_length: 1000,
            sensitive_fields: Vec::new(),
        }
    }
}

/// External analysis agents configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service. Each stage is posted to `<endpoint>/<stage>`.
    pub endpoint: Option<String>,

    /// Environment variable holding the service API key.
    pub api_key_env: String,

    /// Timeout for a single agent request, in seconds.
    pub request_timeout_secs: u64,

    /// Time budget for the whole run, in seconds.
    pub total_timeout_secs: u64,

    /// Pause between stages to stay under provider rate limits, in milliseconds.
    pub step_delay_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "NFEX_API_KEY".to_string(),
            request_timeout_secs: 120,
            total_timeout_secs: 300,
            step_delay_ms: 2000,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// CSV field delimiter.
    pub csv_delimiter: char,

    /// Pretty-print JSON output.
    pub pretty_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_delimiter: ',',
            pretty_json: true,
        }
    }
}

impl OutputConfig {
    /// Delimiter as a byte, falling back to a comma for non-ASCII characters.
    pub fn delimiter_byte(&self) -> u8 {
        if self.csv_delimiter.is_ascii() {
            self.csv_delimiter as u8
        } else {
            b','
        }
    }
}

impl NfexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> crate::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check value ranges that serde cannot express. The first offending
    /// key is reported in dotted form.
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |key: &str, reason: &str| {
            Err(NfexError::Config {
                key: key.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.extraction.namespace.trim().is_empty() {
            return invalid("extraction.namespace", "must not be empty");
        }
        if self.protection.passphrase_env.trim().is_empty() {
            return invalid("protection.passphrase_env", "must name an environment variable");
        }
        if self.protection.max_field_length == 0 {
            return invalid("protection.max_field_length", "must be greater than zero");
        }

        let analysis = &self.analysis;
        if let Some(endpoint) = &analysis.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return invalid("analysis.endpoint", "must be an http:// or https:// URL");
            }
        }
        if analysis.api_key_env.trim().is_empty() {
            return invalid("analysis.api_key_env", "must name an environment variable");
        }
        if analysis.request_timeout_secs == 0 {
            return invalid("analysis.request_timeout_secs", "must be greater than zero");
        }
        if analysis.total_timeout_secs == 0 {
            return invalid("analysis.total_timeout_secs", "must be greater than zero");
        }
        if analysis.request_timeout_secs > analysis.total_timeout_secs {
            return invalid(
                "analysis.request_timeout_secs",
                "must not exceed analysis.total_timeout_secs",
            );
        }

        let delimiter = self.output.csv_delimiter;
        if !delimiter.is_ascii() || delimiter == '"' || delimiter == '\n' || delimiter == '\r' {
            return invalid(
                "output.csv_delimiter",
                "must be an ASCII character other than a quote or newline",
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: NfexConfig =
            serde_json::from_str(r#"{"analysis": {"endpoint": "http://localhost:8080"}}"#).unwrap();

        assert_eq!(config.analysis.endpoint.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.analysis.total_timeout_secs, 300);
        assert_eq!(config.extraction.namespace, NFE_NAMESPACE);
        assert!(config.protection.enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = NfexConfig::default();
        config.analysis.step_delay_ms = 0;
        config.save(&path).unwrap();

        let loaded = NfexConfig::from_file(&path).unwrap();
        assert_eq!(loaded.analysis.step_delay_ms, 0);
        assert_eq!(loaded.output.csv_delimiter, ',');
    }

    #[test]
    fn test_invalid_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = NfexConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, crate::NfexError::Json(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NfexConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, crate::NfexError::Io(_)));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(NfexConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_analysis_values() {
        let cases: [(&str, fn(&mut NfexConfig)); 4] = [
            ("analysis.total_timeout_secs", |c| c.analysis.total_timeout_secs = 0),
            ("analysis.request_timeout_secs", |c| c.analysis.request_timeout_secs = 0),
            ("analysis.request_timeout_secs", |c| c.analysis.request_timeout_secs = 600),
            ("analysis.endpoint", |c| c.analysis.endpoint = Some("localhost:8080".to_string())),
        ];

        for (expected, mutate) in cases {
            let mut config = NfexConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(NfexError::Config { key, .. }) => assert_eq!(key, expected),
                other => panic!("{expected}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_delimiter_and_protection() {
        let mut config = NfexConfig::default();
        config.output.csv_delimiter = '"';
        assert!(config.validate().is_err());

        config.output.csv_delimiter = '\t';
        assert!(config.validate().is_ok());

        config.protection.max_field_length = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: protection.max_field_length: must be greater than zero"
        );
    }

    #[test]
    fn test_delimiter_byte() {
        let mut output = OutputConfig::default();
        assert_eq!(output.delimiter_byte(), b',');
        output.csv_delimiter = ';';
        assert_eq!(output.delimiter_byte(), b';');
        output.csv_delimiter = '§';
        assert_eq!(output.delimiter_byte(), b',');
    }
}
