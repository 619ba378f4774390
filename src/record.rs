// 🧾 Records - Shapes that flow between pipeline stages
// Both sources (statements and alerts) land in IntermediateRecord before
// categorization; CanonicalTransaction is what the ledger writer consumes.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::rules::CategoryAssignment;

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnType {
    /// Money left the account
    Debit,

    /// Money entered the account
    Credit,

    /// Direction could not be inferred (zero or missing balance delta)
    Unset,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::Debit => "Debit",
            TxnType::Credit => "Credit",
            TxnType::Unset => "Unset",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, TxnType::Unset)
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxnType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "debit" => Ok(TxnType::Debit),
            "credit" => Ok(TxnType::Credit),
            "unset" | "unknown" | "" => Ok(TxnType::Unset),
            other => Err(anyhow!("unknown transaction type: {}", other)),
        }
    }
}

// ============================================================================
// INTERMEDIATE RECORD (source-agnostic)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateRecord {
    pub amount: Option<Decimal>,
    pub payee: Option<String>,
    pub txn_type: Option<TxnType>,
    pub reference_number: Option<String>,

    /// ISO `YYYY-MM-DD` when the source date could be parsed, raw text otherwise
    pub date: String,
}

impl IntermediateRecord {
    /// Attach a category, collapsing a missing type to `Unset`
    pub fn into_canonical(self, category: CategoryAssignment) -> CanonicalTransaction {
        CanonicalTransaction {
            date: self.date,
            payee: self.payee,
            txn_type: self.txn_type.unwrap_or(TxnType::Unset),
            amount: self.amount,
            reference_number: self.reference_number,
            category: Some(category),
        }
    }
}

// ============================================================================
// CANONICAL TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    pub date: String,
    pub payee: Option<String>,
    pub txn_type: TxnType,
    pub amount: Option<Decimal>,
    pub reference_number: Option<String>,
    pub category: Option<CategoryAssignment>,
}

impl CanonicalTransaction {
    /// Parse the stored date, which must already be ISO formatted
    pub fn txn_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| anyhow!("invalid transaction date '{}': {}", self.date, e))
    }
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Formats seen across statements (`DD/MM/YY`) and alerts (`D-M-YY`, `DD-MM-YYYY`).
/// Two-digit years are tried first; `%Y` would accept "26" as the year 26.
const DATE_FORMATS: [&str; 5] = ["%d/%m/%y", "%d-%m-%y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

pub fn parse_source_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Normalize a source date to ISO so both sources fingerprint identically.
/// Unparseable text is kept (trimmed) and rejected later by the ledger writer.
pub fn normalize_date(raw: &str) -> String {
    match parse_source_date(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.trim().to_string(),
    }
}

/// Parse a statement/alert amount such as "1,23,456.50"
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(cleaned.trim_end_matches('.')).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_statement_date() {
        assert_eq!(normalize_date("05/11/25"), "2025-11-05");
    }

    #[test]
    fn test_normalize_alert_dates() {
        assert_eq!(normalize_date("9-2-26"), "2026-02-09");
        assert_eq!(normalize_date("09-02-2026"), "2026-02-09");
        assert_eq!(normalize_date("2026-02-09"), "2026-02-09");
    }

    #[test]
    fn test_unparseable_date_kept() {
        assert_eq!(normalize_date("  yesterday "), "yesterday");
    }

    #[test]
    fn test_parse_amount_with_grouping() {
        assert_eq!(parse_amount("1,23,456.50"), Some(dec!(123456.50)));
        assert_eq!(parse_amount("200."), Some(dec!(200)));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn test_txn_type_from_str() {
        assert_eq!("DEBIT".parse::<TxnType>().unwrap(), TxnType::Debit);
        assert_eq!("Unknown".parse::<TxnType>().unwrap(), TxnType::Unset);
        assert!("sideways".parse::<TxnType>().is_err());
    }
}
