//! Brazilian federative unit (UF) codes.

use std::borrow::Cow;

/// IBGE numeric state codes and their two-letter abbreviations.
pub const STATE_CODES: [(&str, &str); 27] = [
    ("11", "RO"), ("12", "AC"), ("13", "AM"), ("14", "RR"), ("15", "PA"), ("16", "AP"), ("17", "TO"),
    ("21", "MA"), ("22", "PI"), ("23", "CE"), ("24", "RN"), ("25", "PB"), ("26", "PE"), ("27", "AL"),
    ("28", "SE"), ("29", "BA"),
    ("31", "MG"), ("32", "ES"), ("33", "RJ"), ("35", "SP"),
    ("41", "PR"), ("42", "SC"), ("43", "RS"),
    ("50", "MS"), ("51", "MT"), ("52", "GO"), ("53", "DF"),
];

/// Abbreviation for a numeric state code, if the code is known.
pub fn abbreviation(code: &str) -> Option<&'static str> {
    STATE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, abbr)| *abbr)
}

/// Convert a numeric state code to its abbreviation.
///
/// Unknown codes (and values that are already abbreviations) pass through.
pub fn to_abbreviation(code: &str) -> Cow<'_, str> {
    match abbreviation(code) {
        Some(abbr) => Cow::Borrowed(abbr),
        None => Cow::Borrowed(code),
    }
}
