//! Screening of field values before they are sent to external services.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INJECTION_PATTERNS: Vec<Regex> = [
        r"(?is)<script.*?>.*?</script>",
        r"(?i)javascript:",
        r"(?i)(union|select|insert|update|delete|drop)\s+",
        r"(\|\||&&|;)",
        r"(?i)(eval\(|exec\(|system\()",
        r"(?s)(\{\{.*\}\}|\$\{.*\})",
        r"(?i)(prompt\(|alert\(|confirm\()",
        r"(?i)(import\s+|from\s+.*import)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x1f\x7f-\x{9f}]").unwrap();

    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Whether a value looks like a script, SQL, shell or template injection attempt.
pub fn is_suspicious(value: &str) -> bool {
    INJECTION_PATTERNS.iter().any(|p| p.is_match(value))
}

/// Strip control characters and markup, truncate to `max_len` characters and trim.
pub fn sanitize(value: &str, max_len: usize) -> String {
    let without_controls = CONTROL_CHARS.replace_all(value, "");
    let without_tags = MARKUP_TAG.replace_all(&without_controls, "");

    let truncated = if without_tags.chars().count() > max_len {
        let mut cut: String = without_tags.chars().take(max_len).collect();
        cut.push_str("...");
        cut
    } else {
        without_tags.into_owned()
    };

    truncated.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_injection_patterns() {
        assert!(is_suspicious(r#"<script>alert("xss")</script>"#));
        assert!(is_suspicious("Empresa; DROP TABLE users; --"));
        assert!(is_suspicious("javascript:void(0)"));
        assert!(is_suspicious("{{ config }}"));
        assert!(is_suspicious("${HOME}"));
        assert!(is_suspicious("from os import system"));
    }

    #[test]
    fn test_regular_values_pass() {
        assert!(!is_suspicious("Fornecedor Mineiro Ltda"));
        assert!(!is_suspicious("12.345.678/0001-90"));
        assert!(!is_suspicious("Belo Horizonte"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  Loja\u{0007} <b>Central</b> ", 1000), "Loja Central");
        assert_eq!(sanitize("abcdef", 3), "abc...");
    }
}
