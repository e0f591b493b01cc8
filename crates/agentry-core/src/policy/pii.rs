//! Pattern-based PII detection and redaction.

use std::sync::OnceLock;

use agentry_types::policy::PiiKind;
use regex::Regex;

static PATTERNS: OnceLock<Vec<(PiiKind, Regex)>> = OnceLock::new();

const REDACTED: &str = "[REDACTED]";

fn patterns() -> &'static [(PiiKind, Regex)] {
    PATTERNS.get_or_init(|| {
        [
            (
                PiiKind::Email,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            ),
            // German phone numbers: +49 or a leading zero, digits may be
            // grouped with single spaces.
            (PiiKind::Phone, r"(?:\+49 ?|\b0)[1-9][\d ]{1,14}\d\b"),
            (
                PiiKind::Iban,
                r"\b[A-Z]{2}\d{2}[A-Z0-9]{4}\d{7}([A-Z0-9]?){0,16}\b",
            ),
            (
                PiiKind::CreditCard,
                r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
            ),
        ]
        .into_iter()
        .map(|(kind, pattern)| {
            (kind, Regex::new(pattern).expect("PII pattern literal is valid"))
        })
        .collect()
    })
}

/// Kinds of PII found in `text`, in a fixed order (email, phone, iban, credit_card).
pub fn detect_pii(text: &str) -> Vec<PiiKind> {
    patterns()
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(kind, _)| *kind)
        .collect()
}

/// Replace every PII match with `[REDACTED]`.
pub fn redact_pii(text: &str) -> String {
    patterns()
        .iter()
        .fold(text.to_string(), |acc, (_, re)| {
            re.replace_all(&acc, REDACTED).into_owned()
        })
}
