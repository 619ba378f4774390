// Expense Ledger - Core Library
// Statement and alert ingestion into a deduplicated, categorized SQLite ledger

pub mod alerts;         // Alert text → intermediate record
pub mod classifier;     // Rule table + oracle fallback
pub mod config;
pub mod db;             // Ledger writer, queries, run log
pub mod document;       // Password-gated page extraction
pub mod fingerprint;
pub mod merchant;       // Narration → payee
pub mod oracle;
pub mod parser;         // Line reconstructor
pub mod pipeline;
pub mod reconciliation; // Balance delta → debit / credit
pub mod record;
pub mod rules;

// Re-export commonly used types
pub use alerts::{parse_alert, parse_alerts, ParsedAlerts};
pub use classifier::{Classifier, ClassifierStats};
pub use config::{load_config, save_config, init_config, Config, OracleProvider};
pub use db::{
    LedgerEntry, WriteOutcome, WriteSummary, DailySummary,
    setup_database, upsert_with_conflict_policy, write_entries,
    entries_on, all_entries, verify_count, daily_summary, export_csv,
    insert_run, recent_runs,
};
pub use document::{
    AccessError, PageError, PageResult, DocumentReader,
    PdftotextReader, TextDocumentReader, open_with_retry,
};
pub use fingerprint::{fingerprint, FingerprintGenerator, KeyField};
pub use merchant::NarrationNormalizer;
pub use oracle::{ClassificationOracle, OracleError, NoOracle};
#[cfg(feature = "openai")]
pub use oracle::OpenAiOracle;
pub use parser::{
    LayoutProfile, LineReconstructor, PendingTransaction, RawLine,
    reconstruct_page, reconstruct_document,
};
pub use pipeline::{Pipeline, PipelineSettings, RunSource, RunSummary};
pub use reconciliation::{reconcile, ReconciledEntry, ReconciliationReport};
pub use record::{CanonicalTransaction, IntermediateRecord, TxnType};
pub use rules::{
    Category, CategoryAssignment, RuleTable, RuleStore,
    JsonRuleStore, MemoryRuleStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
