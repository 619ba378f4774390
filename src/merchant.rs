// 🏪 Merchant Extraction - Clean payee names out of statement narrations
//
// Transfer narrations look like:
//   UPI-SWIGGY LIMITED-swiggy.rzp@axisbank-ICI3a8f...-Payment
// The merchant sits between the protocol marker and the last hyphen before
// the "@handle" segment.

use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_TRANSFER_MARKERS: [&str; 2] = ["UPI-", "TRANSFER-"];

/// Trailing "-<TXN ID>" run (10+ uppercase alphanumerics) and whatever follows it
fn trailing_txn_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-[A-Z0-9]{10,}.*$").expect("valid regex"))
}

#[derive(Debug, Clone)]
pub struct NarrationNormalizer {
    markers: Vec<String>,
}

impl NarrationNormalizer {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NarrationNormalizer {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Extract the payee from a raw narration.
    /// Non-transfer narrations come back trimmed and otherwise untouched.
    pub fn normalize(&self, narration: &str) -> String {
        let narration = narration.trim();

        let Some(after_marker) = self.text_after_marker(narration) else {
            return narration.to_string();
        };

        if let Some(merchant) = merchant_before_handle(after_marker) {
            return merchant;
        }

        let stripped = trailing_txn_id_re().replace(after_marker, "");
        let stripped = stripped.trim();
        if !stripped.is_empty() {
            return stripped.to_string();
        }

        narration.to_string()
    }

    fn text_after_marker<'a>(&self, narration: &'a str) -> Option<&'a str> {
        self.markers.iter().find_map(|marker| {
            narration
                .find(marker.as_str())
                .map(|pos| &narration[pos + marker.len()..])
        })
    }
}

impl Default for NarrationNormalizer {
    fn default() -> Self {
        NarrationNormalizer::new(DEFAULT_TRANSFER_MARKERS)
    }
}

/// "AMAZON PAY-amazonpay@icici..." -> "AMAZON PAY"
fn merchant_before_handle(segment: &str) -> Option<String> {
    let (before_at, _) = segment.split_once('@')?;

    let candidate = match before_at.rfind('-') {
        Some(idx) if idx > 0 => before_at[..idx].trim(),
        _ => before_at.trim(),
    };

    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_with_handle() {
        let n = NarrationNormalizer::default();
        assert_eq!(
            n.normalize("TRANSFER-AMAZON PAY-amazonpay@icici-TXN00123456"),
            "AMAZON PAY"
        );
    }

    #[test]
    fn test_upi_narration() {
        let n = NarrationNormalizer::default();
        assert_eq!(
            n.normalize("UPI-SWIGGY LIMITED-swiggy.rzp@axisbank-ICI3a8f21b9-Payment"),
            "SWIGGY LIMITED"
        );
    }

    #[test]
    fn test_merchant_hyphenated_keeps_prefix() {
        // Only the last hyphen before '@' is treated as the handle separator
        let n = NarrationNormalizer::default();
        assert_eq!(
            n.normalize("UPI-JIO-MART STORE-jiomart@hdfcbank-REF1"),
            "JIO-MART STORE"
        );
    }

    #[test]
    fn test_no_hyphen_before_handle() {
        let n = NarrationNormalizer::default();
        assert_eq!(n.normalize("UPI-RAVI KUMAR@oksbi"), "RAVI KUMAR");
    }

    #[test]
    fn test_fallback_strips_transaction_id() {
        let n = NarrationNormalizer::default();
        assert_eq!(
            n.normalize("UPI-ELECTRICITY BOARD-ABCD1234567890-extra"),
            "ELECTRICITY BOARD"
        );
    }

    #[test]
    fn test_non_transfer_passthrough() {
        let n = NarrationNormalizer::default();
        assert_eq!(n.normalize("  ATM WDL SECTOR 18  "), "ATM WDL SECTOR 18");
        assert_eq!(n.normalize(""), "");
    }

    #[test]
    fn test_custom_markers() {
        let n = NarrationNormalizer::new(["IMPS-"]);
        assert_eq!(n.normalize("IMPS-ACME CORP-acme@ybl"), "ACME CORP");
        assert_eq!(n.normalize("UPI-ACME CORP-acme@ybl"), "UPI-ACME CORP-acme@ybl");
    }
}
