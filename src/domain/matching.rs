//! Pure matching rules for pairing bank deposits with invoices.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use utoipa::ToSchema;

/// Amounts within one cent are considered equal.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Maximum distance between deposit and invoice date for an amount+date match.
pub const DATE_TOLERANCE_DAYS: i64 = 60;

pub const INVOICE_NUMBER_CONFIDENCE: f64 = 1.0;
pub const AMOUNT_EMAIL_CONFIDENCE: f64 = 0.9;
/// Scaled by the date proximity score.
pub const AMOUNT_DATE_BASE_CONFIDENCE: f64 = 0.7;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    InvoiceNumber,
    AmountEmail,
    AmountDate,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::InvoiceNumber => "invoice_number",
            MatchType::AmountEmail => "amount_email",
            MatchType::AmountDate => "amount_date",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invoice_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)INV[/-]?\d{4}[/-]\d+", // INV/2025/0001, INV-2025-0001
            r"(?i)Invoice\s*#?\s*(\d+)", // Invoice #123
            r"(?i)Inv\s*#?\s*(\d+)",     // Inv #123
            r"(?i)AIQSO[/-]?\d+",        // AIQSO-001
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invoice pattern is valid"))
        .collect()
    })
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern is valid")
    })
}

/// First invoice reference found in `text`, upper-cased. Patterns are tried in priority order.
pub fn extract_invoice_number(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    invoice_patterns()
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().to_uppercase())
}

/// First email address found in `text`, lower-cased.
pub fn extract_email(text: &str) -> Option<String> {
    email_pattern()
        .find(text)
        .map(|m| m.as_str().to_lowercase())
}

pub fn is_valid_email(candidate: &str) -> bool {
    email_pattern()
        .find(candidate)
        .map_or(false, |m| m.start() == 0 && m.end() == candidate.len())
}

/// Calendar date of a bank timestamp (RFC 3339, or anything starting with `YYYY-MM-DD`).
pub fn parse_transaction_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// `1 - days/(tolerance+1)` when the dates are within `tolerance_days`, else `None`.
pub fn date_proximity_score(a: NaiveDate, b: NaiveDate, tolerance_days: i64) -> Option<f64> {
    let days = (a - b).num_days().abs();
    (days <= tolerance_days).then(|| 1.0 - days as f64 / (tolerance_days + 1) as f64)
}

/// Compared in whole cents so float noise at the boundary does not matter.
pub fn amounts_match(a: f64, b: f64) -> bool {
    ((a - b).abs() * 100.0).round() <= (AMOUNT_TOLERANCE * 100.0).round()
}
