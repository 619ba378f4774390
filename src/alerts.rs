// 📨 Alert Parser - Transaction alert text → IntermediateRecord
//
// Typical alert:
//   "Rs.250.00 has been debited from account **1234 to VPA swiggy@axis
//    SWIGGY LIMITED on 01-11-25. Your UPI transaction reference number is
//    530512345678."
//
// Messages without a reference number are not transaction alerts (OTPs,
// promotions that slipped through the upstream filter) and are skipped.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::record::{normalize_date, parse_amount, IntermediateRecord, TxnType};

const DEBIT_KEYWORDS: [&str; 5] = ["debited", "upi/dr", "spent", "withdrawn", "purchase"];
const CREDIT_KEYWORDS: [&str; 4] = ["credited", "upi/cr", "received", "refund"];

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Rs\.?\s?([\d.,]+)").expect("amount regex"))
}

fn payee_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[a-zA-Z]+\s+(.+?)\s+on").expect("payee regex"))
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)reference number is\s+(\d+)").expect("reference regex"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bon\s+(\d{1,2}-\d{1,2}-\d{2,4})").expect("date regex"))
}

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Debit keywords are checked first; an alert mentioning both is a debit
pub fn infer_alert_type(text: &str) -> TxnType {
    let lowered = text.to_lowercase();
    if DEBIT_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        TxnType::Debit
    } else if CREDIT_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        TxnType::Credit
    } else {
        TxnType::Unset
    }
}

/// Parse one alert; `None` when it carries no reference number
pub fn parse_alert(text: &str) -> Option<IntermediateRecord> {
    let reference_number = capture(reference_re(), text)?.to_string();

    let payee = capture(payee_re(), text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from);

    Some(IntermediateRecord {
        amount: capture(amount_re(), text).and_then(parse_amount),
        payee,
        txn_type: Some(infer_alert_type(text)),
        reference_number: Some(reference_number),
        date: capture(date_re(), text).map(normalize_date).unwrap_or_default(),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAlerts {
    pub records: Vec<IntermediateRecord>,

    /// Messages dropped for lacking a reference number
    pub skipped: usize,
}

pub fn parse_alerts<S: AsRef<str>>(messages: &[S]) -> ParsedAlerts {
    let mut parsed = ParsedAlerts::default();
    for (i, message) in messages.iter().enumerate() {
        match parse_alert(message.as_ref()) {
            Some(record) => parsed.records.push(record),
            None => {
                debug!(index = i, "no reference number, skipping alert");
                parsed.skipped += 1;
            }
        }
    }
    parsed
}
