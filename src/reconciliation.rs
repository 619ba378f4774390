// ⚖️ Balance Reconciliation - Infer direction and amount from running balance
//
// Statements print one amount column and a running balance, so the balance
// delta between consecutive rows is the only reliable debit/credit signal:
//
//   delta = balance[i] - balance[i-1]
//   delta < 0  → Debit  |delta|
//   delta > 0  → Credit |delta|
//   otherwise  → Unset (kept, no amount)
//
// The first row has no predecessor; its printed amount is taken as a debit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::parser::PendingTransaction;
use crate::record::{parse_amount, TxnType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledEntry {
    pub txn_type: TxnType,
    pub amount: Option<Decimal>,
}

impl ReconciledEntry {
    fn debit(amount: Decimal) -> Self {
        ReconciledEntry { txn_type: TxnType::Debit, amount: Some(amount) }
    }

    fn credit(amount: Decimal) -> Self {
        ReconciledEntry { txn_type: TxnType::Credit, amount: Some(amount) }
    }

    fn unset() -> Self {
        ReconciledEntry { txn_type: TxnType::Unset, amount: None }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// One entry per input record, same order
    pub entries: Vec<ReconciledEntry>,
    pub total_debits: Decimal,
    pub total_credits: Decimal,

    /// Records left as `Unset`
    pub unresolved: usize,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} records: debits {}, credits {}, unresolved {}",
            self.entries.len(),
            self.total_debits,
            self.total_credits,
            self.unresolved
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// Reconcile one document's records, in statement order, across all pages
pub fn reconcile(records: &[PendingTransaction]) -> ReconciliationReport {
    let balances: Vec<Option<Decimal>> = records
        .iter()
        .map(|r| r.raw_balance.as_deref().and_then(parse_amount))
        .collect();

    let mut report = ReconciliationReport::default();

    for (i, record) in records.iter().enumerate() {
        let entry = if i == 0 {
            match record.raw_amount.as_deref().and_then(parse_amount) {
                Some(amount) => ReconciledEntry::debit(amount),
                None => ReconciledEntry::unset(),
            }
        } else {
            entry_from_delta(balances[i - 1], balances[i])
        };

        match entry.txn_type {
            TxnType::Debit => report.total_debits += entry.amount.unwrap_or_default(),
            TxnType::Credit => report.total_credits += entry.amount.unwrap_or_default(),
            TxnType::Unset => report.unresolved += 1,
        }
        report.entries.push(entry);
    }

    report
}

fn entry_from_delta(previous: Option<Decimal>, current: Option<Decimal>) -> ReconciledEntry {
    let (Some(previous), Some(current)) = (previous, current) else {
        return ReconciledEntry::unset();
    };

    let delta = current - previous;
    match delta.cmp(&Decimal::ZERO) {
        Ordering::Less => ReconciledEntry::debit(delta.abs()),
        Ordering::Greater => ReconciledEntry::credit(delta.abs()),
        Ordering::Equal => ReconciledEntry::unset(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending(amount: Option<&str>, balance: Option<&str>) -> PendingTransaction {
        PendingTransaction {
            date: "01/11/25".to_string(),
            narration: "TEST".to_string(),
            cheque_number: None,
            raw_amount: amount.map(String::from),
            raw_balance: balance.map(String::from),
            page: 0,
            line: 0,
        }
    }

    #[test]
    fn test_balance_series() {
        let records = vec![
            pending(Some("200.00"), Some("1,000.00")),
            pending(Some("200.00"), Some("800.00")),
            pending(Some("150.00"), Some("950.00")),
            pending(Some("75.00"), Some("950.00")),
        ];

        let report = reconcile(&records);

        assert_eq!(
            report.entries,
            vec![
                ReconciledEntry::debit(dec!(200)),
                ReconciledEntry::debit(dec!(200)),
                ReconciledEntry::credit(dec!(150)),
                ReconciledEntry::unset(),
            ]
        );
        assert_eq!(report.total_debits, dec!(400));
        assert_eq!(report.total_credits, dec!(150));
        assert_eq!(report.unresolved, 1);
    }

    #[test]
    fn test_printed_amount_ignored_after_first_row() {
        // Delta wins over the printed magnitude
        let records = vec![
            pending(Some("10.00"), Some("500.00")),
            pending(Some("999.00"), Some("450.00")),
        ];

        let report = reconcile(&records);
        assert_eq!(report.entries[1], ReconciledEntry::debit(dec!(50)));
    }

    #[test]
    fn test_missing_balance_is_unset() {
        let records = vec![
            pending(Some("10.00"), Some("500.00")),
            pending(Some("20.00"), None),
            pending(Some("30.00"), Some("470.00")),
        ];

        let report = reconcile(&records);
        assert_eq!(report.entries[1], ReconciledEntry::unset());
        // Previous balance missing too
        assert_eq!(report.entries[2], ReconciledEntry::unset());
        assert_eq!(report.unresolved, 2);
    }

    #[test]
    fn test_first_row_without_amount() {
        let report = reconcile(&[pending(None, Some("100.00"))]);
        assert_eq!(report.entries, vec![ReconciledEntry::unset()]);
    }

    #[test]
    fn test_empty_document() {
        let report = reconcile(&[]);
        assert!(report.entries.is_empty());
        assert_eq!(report.unresolved, 0);
    }
}
