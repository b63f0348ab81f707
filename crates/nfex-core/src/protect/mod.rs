//! Selective protection of sensitive NF-e fields.
//!
//! Identity data (tax IDs, names, registrations, document numbers and
//! address parts) is encrypted before the extraction is handed to external
//! analysis. Product, tax and operation fields stay in clear text because
//! the analysis depends on them.

mod cipher;
mod guard;

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ProtectError;
use crate::extract::DEFAULT_VALUE;
use crate::models::config::ProtectionConfig;
use crate::models::record::{Extraction, Record};

pub use cipher::FieldCipher;
pub use guard::{is_suspicious, sanitize};

/// Prefix of every encrypted value.
pub const ENCRYPTED_PREFIX: &str = "ENC:";

/// Replacement for values that matched an injection pattern.
pub const BLOCKED_CONTENT: &str = "[BLOCKED_CONTENT]";

/// Replacement for values that could not be decrypted.
pub const DECRYPT_ERROR: &str = "[DECRYPT_ERROR]";

/// Version tag written to protected records.
pub const PROTECTION_VERSION: &str = "2.0_selective";

/// Suffix of the hash index column written next to each protected field.
pub const HASH_SUFFIX: &str = "_hash";

/// Fields encrypted by default.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "Emitente CNPJ",
    "Destinatário CNPJ",
    "Transportadora CNPJ",
    "Destinatário CPF",
    "Emitente IE",
    "Destinatário IE",
    "Emitente Nome",
    "Destinatário Nome",
    "Transportadora Nome",
    "Emitente Fantasia",
    "Número NF",
    "Chave NFe",
    "Protocolo",
    "Emitente CEP",
    "Destinatário CEP",
    "Emitente Município",
    "Destinatário Município",
    "Emitente Logradouro",
    "Destinatário Logradouro",
];

/// Fields that are never encrypted. Only counted for the audit columns.
pub const PUBLIC_FIELDS: &[&str] = &[
    "Produto", "Descrição", "NCM", "CFOP", "Unidade", "Quantidade",
    "Valor Unitário", "Valor Total", "Base ICMS", "Alíquota ICMS", "Valor ICMS",
    "Base PIS", "Alíquota PIS", "Valor PIS", "Base COFINS", "Alíquota COFINS",
    "Valor COFINS", "Valor IPI", "Base IPI", "Alíquota IPI",
    "Natureza Operação", "UF", "Modelo", "Série", "Tipo NF", "Finalidade",
    "Data Emissão", "Data Saída/Entrada",
];

/// The encryption collaborator seam: takes an extraction and returns an
/// equally shaped one with some fields obscured.
pub trait FieldProtector {
    fn protect(&mut self, extraction: &Extraction) -> Result<Extraction, ProtectError>;
}

/// Running counters for audit output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProtectionStats {
    pub total_records: usize,
    pub encrypted_fields: usize,
    /// Public columns seen, summed over every table protected.
    pub public_fields: usize,
    pub blocked_injections: usize,
}

/// AES-256-GCM protector for a fixed list of sensitive fields.
pub struct SelectiveProtector {
    cipher: FieldCipher,
    sensitive: Vec<String>,
    max_field_length: usize,
    stats: ProtectionStats,
}

impl SelectiveProtector {
    /// Create a protector whose key is derived from a passphrase.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, ProtectError> {
        if passphrase.is_empty() {
            return Err(ProtectError::MissingKey("empty passphrase".to_string()));
        }
        Ok(Self::with_cipher(FieldCipher::from_passphrase(passphrase)))
    }

    /// Create a protector from the configured passphrase environment variable.
    pub fn from_config(config: &ProtectionConfig) -> Result<Self, ProtectError> {
        let passphrase = std::env::var(&config.passphrase_env)
            .map_err(|_| ProtectError::MissingKey(format!("${} is not set", config.passphrase_env)))?;

        let mut protector = Self::from_passphrase(&passphrase)?.with_max_field_length(config.max_field_length);
        if !config.sensitive_fields.is_empty() {
            protector = protector.with_sensitive_fields(config.sensitive_fields.iter().cloned());
        }
        Ok(protector)
    }

    fn with_cipher(cipher: FieldCipher) -> Self {
        Self {
            cipher,
            sensitive: SENSITIVE_FIELDS.iter().map(|f| f.to_string()).collect(),
            max_field_length: 1000,
            stats: ProtectionStats::default(),
        }
    }

    /// Replace the sensitive field list.
    pub fn with_sensitive_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.sensitive = fields.into_iter().collect();
        self
    }

    /// Set the truncation limit for sanitized values.
    pub fn with_max_field_length(mut self, max: usize) -> Self {
        self.max_field_length = max;
        self
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &ProtectionStats {
        &self.stats
    }

    /// Protect every sensitive field of a set of records that share a shape.
    ///
    /// Each protected field gets a companion `<field>_hash` column, and every
    /// record gets the audit columns.
    pub fn protect_records(&mut self, records: &[Record]) -> Result<Vec<Record>, ProtectError> {
        self.stats.total_records += records.len();

        let present: HashSet<&str> = records.iter().flat_map(Record::keys).collect();
        let sensitive: Vec<String> = self
            .sensitive
            .iter()
            .filter(|f| present.contains(f.as_str()))
            .cloned()
            .collect();
        let public_count = PUBLIC_FIELDS.iter().filter(|f| present.contains(*f)).count();
        self.stats.public_fields += public_count;

        debug!("Sensitive fields to encrypt: {:?}", sensitive);

        let timestamp = Utc::now().to_rfc3339();
        let mut output = Vec::with_capacity(records.len());

        for record in records {
            let mut protected = Record::new();
            for (key, value) in record.iter() {
                if !sensitive.iter().any(|s| s == key) {
                    protected.insert(key, value);
                    continue;
                }
                let (cipher_text, hash) = self.protect_value(key, value)?;
                protected.insert(key, cipher_text);
                protected.insert(format!("{key}{HASH_SUFFIX}"), hash);
            }
            protected.insert("_encrypted_timestamp", timestamp.as_str());
            protected.insert("_encryption_version", PROTECTION_VERSION);
            protected.insert("_public_fields_count", public_count.to_string());
            protected.insert("_encrypted_fields_count", sensitive.len().to_string());
            output.push(protected);
        }

        info!(
            "Protected {} records ({} sensitive columns, {} values encrypted)",
            records.len(),
            sensitive.len(),
            self.stats.encrypted_fields
        );
        Ok(output)
    }

    fn protect_value(&mut self, field: &str, value: &str) -> Result<(String, String), ProtectError> {
        let screened = if is_suspicious(value) {
            warn!("Blocked suspicious content in field {}", field);
            self.stats.blocked_injections += 1;
            BLOCKED_CONTENT
        } else {
            value
        };

        let clean = sanitize(screened, self.max_field_length);
        if clean.is_empty() || clean == DEFAULT_VALUE {
            return Ok((value.to_string(), String::new()));
        }

        let encrypted = self.cipher.encrypt(&clean)?;
        self.stats.encrypted_fields += 1;
        Ok((format!("{ENCRYPTED_PREFIX}{encrypted}"), hash_for_index(&clean)))
    }

    /// Decrypt the given fields of a record (all `ENC:` fields when `fields` is empty).
    pub fn reveal(&self, record: &Record, fields: &[&str]) -> Record {
        record
            .iter()
            .map(|(key, value)| {
                let selected = fields.is_empty() || fields.contains(&key);
                match value.strip_prefix(ENCRYPTED_PREFIX) {
                    Some(payload) if selected => {
                        let plain = self.cipher.decrypt(payload).unwrap_or_else(|e| {
                            warn!("Failed to decrypt {}: {}", key, e);
                            DECRYPT_ERROR.to_string()
                        });
                        (key.to_string(), plain)
                    }
                    _ => (key.to_string(), value.to_string()),
                }
            })
            .collect()
    }
}

impl FieldProtector for SelectiveProtector {
    fn protect(&mut self, extraction: &Extraction) -> Result<Extraction, ProtectError> {
        let header = self
            .protect_records(std::slice::from_ref(&extraction.header))?
            .pop()
            .unwrap_or_default();
        let items = self.protect_records(&extraction.items)?;
        Ok(Extraction { header, items })
    }
}

/// Short SHA-256 digest used to look records up without decrypting them.
pub fn hash_for_index(value: &str) -> String {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(value.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Records whose hash column for `field` matches `value`.
pub fn search_by_hash<'a>(records: &'a [Record], field: &str, value: &str) -> Vec<&'a Record> {
    let column = format!("{field}{HASH_SUFFIX}");
    let needle = hash_for_index(value);
    records
        .iter()
        .filter(|r| r.get(&column) == Some(needle.as_str()))
        .collect()
}
