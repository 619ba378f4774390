// 🏗️ Statement Parser - Rebuild transactions from positional page text
//
// A statement page is a stream of lines. A line starting with DD/MM/YY opens
// a new transaction; the trailing tokens of that line are read right-to-left
// against the grammar
//
//     narration* chequeNumber? valueDate? amount? balance?
//
// and any following non-date lines extend the narration until the next date
// line, a terminal footer, or the end of the page.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, trace, warn};

use crate::document::PageResult;

// ============================================================================
// TOKEN PATTERNS
// ============================================================================

fn date_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2}/\d{2}/\d{2})\s+(.+)$").expect("date line regex"))
}

fn numeric_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\d,]+\.?\d*$").expect("numeric token regex"))
}

fn value_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}/\d{2}/\d{2}$").expect("value date regex"))
}

fn cheque_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{16}$").expect("cheque number regex"))
}

fn section_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z\s\*]+$").expect("section header regex"))
}

// ============================================================================
// LAYOUT PROFILE
// ============================================================================

/// Marker strings that identify footers and boilerplate for one bank layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutProfile {
    /// Any line containing one of these ends the page
    pub terminal_markers: Vec<String>,

    /// Lines containing one of these are dropped without touching the narration
    pub boilerplate_markers: Vec<String>,
}

impl LayoutProfile {
    /// HDFC Bank savings account statement layout
    pub fn hdfc() -> Self {
        LayoutProfile {
            terminal_markers: vec![
                "HDFCBANKLIMITED".to_string(),
                "Closingbalance".to_string(),
                "*Closing".to_string(),
            ],
            boilerplate_markers: vec![
                "HDFCBANK".to_string(),
                "Closing".to_string(),
                "Contents".to_string(),
                "State".to_string(),
                "Registered".to_string(),
            ],
        }
    }

    fn is_terminal(&self, line: &str) -> bool {
        self.terminal_markers.iter().any(|m| line.contains(m.as_str()))
    }

    fn is_boilerplate(&self, line: &str) -> bool {
        self.boilerplate_markers.iter().any(|m| line.contains(m.as_str()))
    }
}

impl Default for LayoutProfile {
    fn default() -> Self {
        LayoutProfile::hdfc()
    }
}

// ============================================================================
// CORE TYPES
// ============================================================================

/// One physical line of page text with its page-relative position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    pub index: usize,
    pub text: &'a str,
}

/// Transaction under construction; frozen once the next date line arrives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Posting date as printed (DD/MM/YY)
    pub date: String,
    pub narration: String,
    pub cheque_number: Option<String>,
    pub raw_amount: Option<String>,
    pub raw_balance: Option<String>,

    // Provenance
    pub page: usize,
    pub line: usize,
}

/// Trailing slots read right-to-left from a date line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrailingFields {
    pub narration: String,
    pub cheque_number: Option<String>,
    pub value_date: Option<String>,
    pub amount: Option<String>,
    pub balance: Option<String>,
}

/// How a single line was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Transaction,
    Continuation,
    Boilerplate,
    SectionHeader,
    /// Continuation text with no open transaction
    Orphan,
    Footer,
    /// Line arrived after the footer
    AfterFooter,
}

// ============================================================================
// TRAILING FIELD GRAMMAR
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Slot {
    Balance,
    Amount,
    ValueDate,
    ChequeNumber,
}

impl Slot {
    const RIGHT_TO_LEFT: [Slot; 4] = [Slot::Balance, Slot::Amount, Slot::ValueDate, Slot::ChequeNumber];

    fn accepts(&self, token: &str) -> bool {
        match self {
            Slot::Balance | Slot::Amount => numeric_token_re().is_match(token),
            Slot::ValueDate => value_date_re().is_match(token),
            Slot::ChequeNumber => cheque_number_re().is_match(token),
        }
    }
}

/// Read `{balance, amount, valueDate, chequeNumber}` from the right; every
/// slot is optional and only consumes a token that fits it. What remains on
/// the left is the narration.
pub fn parse_trailing_fields(rest: &str) -> TrailingFields {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut end = tokens.len();
    let mut fields = TrailingFields::default();

    for slot in Slot::RIGHT_TO_LEFT {
        if end == 0 {
            break;
        }
        let token = tokens[end - 1];
        if !slot.accepts(token) {
            continue;
        }

        let value = Some(token.to_string());
        match slot {
            Slot::Balance => fields.balance = value,
            Slot::Amount => fields.amount = value,
            Slot::ValueDate => fields.value_date = value,
            Slot::ChequeNumber => fields.cheque_number = value,
        }
        end -= 1;
    }

    fields.narration = tokens[..end].join(" ");
    fields
}

// ============================================================================
// LINE RECONSTRUCTOR (state machine)
// ============================================================================

#[derive(Debug)]
enum ScanState {
    Idle,
    Accumulating(PendingTransaction),
    Stopped,
}

pub struct LineReconstructor<'p> {
    profile: &'p LayoutProfile,
    page: usize,
    state: ScanState,
    emitted: Vec<PendingTransaction>,
}

impl<'p> LineReconstructor<'p> {
    pub fn new(profile: &'p LayoutProfile, page: usize) -> Self {
        LineReconstructor {
            profile,
            page,
            state: ScanState::Idle,
            emitted: Vec::new(),
        }
    }

    /// Consume one line and report how it was treated
    pub fn feed(&mut self, line: RawLine<'_>) -> LineKind {
        if matches!(self.state, ScanState::Stopped) {
            return LineKind::AfterFooter;
        }

        let text = line.text.trim();
        if text.is_empty() {
            return LineKind::Blank;
        }

        if let Some(caps) = date_line_re().captures(text) {
            self.freeze_current();

            let trailing = parse_trailing_fields(&caps[2]);
            self.state = ScanState::Accumulating(PendingTransaction {
                date: caps[1].to_string(),
                narration: trailing.narration,
                cheque_number: trailing.cheque_number,
                raw_amount: trailing.amount,
                raw_balance: trailing.balance,
                page: self.page,
                line: line.index,
            });
            return LineKind::Transaction;
        }

        if self.profile.is_terminal(text) {
            self.freeze_current();
            self.state = ScanState::Stopped;
            return LineKind::Footer;
        }

        if self.profile.is_boilerplate(text) {
            return LineKind::Boilerplate;
        }

        if section_header_re().is_match(text) {
            return LineKind::SectionHeader;
        }

        match &mut self.state {
            ScanState::Accumulating(pending) => {
                if !pending.narration.is_empty() {
                    pending.narration.push(' ');
                }
                pending.narration.push_str(text);
                LineKind::Continuation
            }
            _ => LineKind::Orphan,
        }
    }

    /// Close the page and return its transactions in line order
    pub fn finish(mut self) -> Vec<PendingTransaction> {
        self.freeze_current();
        self.emitted
    }

    fn freeze_current(&mut self) {
        if let ScanState::Accumulating(pending) = std::mem::replace(&mut self.state, ScanState::Idle) {
            self.emitted.push(pending);
        }
    }
}

/// Reconstruct all transactions on one page
pub fn reconstruct_page(profile: &LayoutProfile, page: usize, text: &str) -> Vec<PendingTransaction> {
    let mut reconstructor = LineReconstructor::new(profile, page);

    for (index, line) in text.lines().enumerate() {
        let kind = reconstructor.feed(RawLine { index, text: line });
        trace!(page, line = index, ?kind, "classified line");
        if kind == LineKind::Footer {
            debug!(page, line = index, "footer reached, ignoring rest of page");
            break;
        }
    }

    reconstructor.finish()
}

/// Transactions of a whole document plus page accounting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructedDocument {
    pub transactions: Vec<PendingTransaction>,
    pub pages_seen: usize,
    pub pages_skipped: usize,
}

/// Reconstruct every readable page; unreadable pages are skipped and counted
pub fn reconstruct_document(profile: &LayoutProfile, pages: &[PageResult]) -> ReconstructedDocument {
    let mut doc = ReconstructedDocument {
        pages_seen: pages.len(),
        ..Default::default()
    };

    for (page, result) in pages.iter().enumerate() {
        match result {
            Ok(text) => {
                let txns = reconstruct_page(profile, page, text);
                debug!(page, transactions = txns.len(), "page reconstructed");
                doc.transactions.extend(txns);
            }
            Err(e) => {
                warn!(page, error = %e, "skipping unreadable page");
                doc.pages_skipped += 1;
            }
        }
    }

    doc
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PageError;

    fn page(text: &str) -> Vec<PendingTransaction> {
        reconstruct_page(&LayoutProfile::hdfc(), 0, text)
    }

    #[test]
    fn test_trailing_fields_all_slots() {
        let f = parse_trailing_fields("NEFT CR-ACME PAYROLL 0000456712349876 05/11/25 45,000.00 1,20,500.75");

        assert_eq!(f.narration, "NEFT CR-ACME PAYROLL");
        assert_eq!(f.cheque_number.as_deref(), Some("0000456712349876"));
        assert_eq!(f.value_date.as_deref(), Some("05/11/25"));
        assert_eq!(f.amount.as_deref(), Some("45,000.00"));
        assert_eq!(f.balance.as_deref(), Some("1,20,500.75"));
    }

    #[test]
    fn test_trailing_fields_missing_value_date() {
        let f = parse_trailing_fields("UPI-SWIGGY-swiggy@icici 0000512398761234 250.00 9,750.00");

        assert_eq!(f.narration, "UPI-SWIGGY-swiggy@icici");
        assert_eq!(f.cheque_number.as_deref(), Some("0000512398761234"));
        assert_eq!(f.value_date, None);
        assert_eq!(f.amount.as_deref(), Some("250.00"));
        assert_eq!(f.balance.as_deref(), Some("9,750.00"));
    }

    #[test]
    fn test_trailing_fields_narration_only() {
        let f = parse_trailing_fields("OPENING BALANCE B/F");
        assert_eq!(f.narration, "OPENING BALANCE B/F");
        assert_eq!(f.balance, None);
        assert_eq!(f.amount, None);
    }

    #[test]
    fn test_continuation_line_merge() {
        let txns = page(
            "01/11/25 UPI-BIG BAZAAR 0000123412341234 01/11/25 1,250.00 8,750.00\n\
             RETAIL-bigbazaar@okaxis\n\
             02/11/25 ATM WDL 02/11/25 500.00 8,250.00\n",
        );

        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].narration, "UPI-BIG BAZAAR RETAIL-bigbazaar@okaxis");
        assert_eq!(txns[0].raw_amount.as_deref(), Some("1,250.00"));
        assert_eq!(txns[1].narration, "ATM WDL");
        assert_eq!(txns[1].raw_balance.as_deref(), Some("8,250.00"));
    }

    #[test]
    fn test_footer_truncation() {
        let txns = page(
            "01/11/25 FIRST 100.00 900.00\n\
             HDFCBANKLIMITED\n\
             02/11/25 SECOND 100.00 800.00\n",
        );

        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].narration, "FIRST");
    }

    #[test]
    fn test_boilerplate_and_headers_skipped() {
        let txns = page(
            "Date Narration Chq./Ref.No. ValueDt WithdrawalAmt. DepositAmt. ClosingBalance\n\
             01/11/25 UPI-CAFE 100.00 900.00\n\
             STATEMENT SUMMARY **\n\
             Registered Office Address: Mumbai\n\
             COFFEE-cafe@ybl\n",
        );

        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].narration, "UPI-CAFE COFFEE-cafe@ybl");
    }

    #[test]
    fn test_orphan_lines_before_first_transaction() {
        let profile = LayoutProfile::hdfc();
        let mut r = LineReconstructor::new(&profile, 0);
        assert_eq!(r.feed(RawLine { index: 0, text: "account holder mr x" }), LineKind::Orphan);
        assert_eq!(r.feed(RawLine { index: 1, text: "   " }), LineKind::Blank);
        assert!(r.finish().is_empty());
    }

    #[test]
    fn test_lines_after_footer_reported() {
        let profile = LayoutProfile::hdfc();
        let mut r = LineReconstructor::new(&profile, 0);
        r.feed(RawLine { index: 0, text: "01/11/25 X 1.00 2.00" });
        assert_eq!(r.feed(RawLine { index: 1, text: "*Closing balance" }), LineKind::Footer);
        assert_eq!(
            r.feed(RawLine { index: 2, text: "02/11/25 Y 1.00 1.00" }),
            LineKind::AfterFooter
        );
        assert_eq!(r.finish().len(), 1);
    }

    #[test]
    fn test_document_skips_bad_pages() {
        let pages: Vec<PageResult> = vec![
            Ok("01/11/25 A 10.00 990.00\n".to_string()),
            Err(PageError { page: 1, reason: "garbled".to_string() }),
            Ok("03/11/25 B 10.00 980.00\n".to_string()),
        ];

        let doc = reconstruct_document(&LayoutProfile::hdfc(), &pages);

        assert_eq!(doc.pages_seen, 3);
        assert_eq!(doc.pages_skipped, 1);
        assert_eq!(doc.transactions.len(), 2);
        assert_eq!(doc.transactions[1].page, 2);
    }
}
