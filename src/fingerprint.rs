// 🔑 Fingerprint Generator - Content identity for cross-source deduplication
//
// fingerprint = sha256( v1 | v2 | ... | vn | )[..32]
// where each vi is the lowercased, trimmed value of the i-th configured key
// field (empty when absent). The key list must be the same for every source.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::record::CanonicalTransaction;

pub const FINGERPRINT_LEN: usize = 32;

const FIELD_DELIMITER: char = '|';

/// Canonical fields that may take part in the fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyField {
    Date,
    Amount,
    Payee,
    Type,
    ReferenceNumber,
    Category,
}

impl KeyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyField::Date => "date",
            KeyField::Amount => "amount",
            KeyField::Payee => "payee",
            KeyField::Type => "type",
            KeyField::ReferenceNumber => "reference_number",
            KeyField::Category => "category",
        }
    }

    /// Raw string form of this field on a transaction (None when absent)
    fn value_of(&self, txn: &CanonicalTransaction) -> Option<String> {
        match self {
            KeyField::Date => Some(txn.date.clone()),
            // normalize() so "200", "200.0" and "200.00" agree
            KeyField::Amount => txn.amount.map(|a| a.normalize().to_string()),
            KeyField::Payee => txn.payee.clone(),
            KeyField::Type => Some(txn.txn_type.as_str().to_string()),
            KeyField::ReferenceNumber => txn.reference_number.clone(),
            KeyField::Category => txn.category.map(|c| c.as_str().to_string()),
        }
    }
}

/// Type is included so two sources that disagree on direction stay apart
pub const DEFAULT_KEY_FIELDS: [KeyField; 4] =
    [KeyField::Date, KeyField::Amount, KeyField::Payee, KeyField::Type];

/// Compute the 32-hex-char fingerprint of a transaction over `keys`, in order
pub fn fingerprint(txn: &CanonicalTransaction, keys: &[KeyField]) -> String {
    let mut material = String::new();
    for key in keys {
        let value = key.value_of(txn).unwrap_or_default();
        material.push_str(&value.trim().to_lowercase());
        material.push(FIELD_DELIMITER);
    }

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Holds one key configuration so every source fingerprints the same way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintGenerator {
    keys: Vec<KeyField>,
}

impl FingerprintGenerator {
    pub fn new(keys: Vec<KeyField>) -> Self {
        FingerprintGenerator { keys }
    }

    pub fn keys(&self) -> &[KeyField] {
        &self.keys
    }

    pub fn generate(&self, txn: &CanonicalTransaction) -> String {
        fingerprint(txn, &self.keys)
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        FingerprintGenerator::new(DEFAULT_KEY_FIELDS.to_vec())
    }
}
