// 🔄 Ingestion Pipeline - Source → IntermediateRecord → category → fingerprint → ledger
//
//   statement: access → reconstruct pages → reconcile → normalize narration ┐
//   alerts:    parse alert text ────────────────────────────────────────────┤
//                                                                           ↓
//                                      classify → fingerprint → write → run log
//
// One run is one batch job. Records are written one at a time; the ledger's
// fingerprint uniqueness is the only coordination with concurrent runs.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::alerts::parse_alerts;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::db::{insert_run, write_entries, WriteSummary};
use crate::document::{open_with_retry, DocumentReader, DEFAULT_MAX_PASSWORD_ATTEMPTS};
use crate::fingerprint::FingerprintGenerator;
use crate::merchant::NarrationNormalizer;
use crate::oracle::ClassificationOracle;
use crate::parser::{reconstruct_document, LayoutProfile};
use crate::reconciliation::reconcile;
use crate::record::{normalize_date, CanonicalTransaction, IntermediateRecord, TxnType};
use crate::rules::RuleStore;

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunSource {
    Statement,
    Alerts,
}

impl RunSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunSource::Statement => "statement",
            RunSource::Alerts => "alerts",
        }
    }
}

impl fmt::Display for RunSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "statement" => Ok(RunSource::Statement),
            "alerts" => Ok(RunSource::Alerts),
            other => Err(anyhow!("unknown run source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: RunSource,
    pub started_at: DateTime<Utc>,

    /// Documents (statement runs) or messages (alert runs) handed in
    pub inputs_seen: usize,
    pub records_inserted: usize,
    pub records_duplicate: usize,
    pub records_failed: usize,
    pub pages_skipped: usize,

    /// Records written with type `Unset`
    pub records_unresolved: usize,

    /// Alerts dropped for lacking a reference number
    pub records_skipped: usize,
}

impl RunSummary {
    pub fn new(source: RunSource) -> Self {
        RunSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            source,
            started_at: Utc::now(),
            inputs_seen: 0,
            records_inserted: 0,
            records_duplicate: 0,
            records_failed: 0,
            pages_skipped: 0,
            records_unresolved: 0,
            records_skipped: 0,
        }
    }

    fn absorb(&mut self, writes: WriteSummary) {
        self.records_inserted += writes.inserted;
        self.records_duplicate += writes.duplicate;
        self.records_failed += writes.failed;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} run {}: {} inserted, {} duplicate, {} failed, {} unresolved, {} pages skipped, {} skipped",
            self.source,
            self.run_id,
            self.records_inserted,
            self.records_duplicate,
            self.records_failed,
            self.records_unresolved,
            self.pages_skipped,
            self.records_skipped
        )
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Everything a run needs from configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fingerprint: FingerprintGenerator,
    pub layout: LayoutProfile,
    pub normalizer: NarrationNormalizer,
    pub max_password_attempts: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        PipelineSettings {
            fingerprint: FingerprintGenerator::new(config.fingerprint.keys.clone()),
            layout: config.statement.layout(),
            normalizer: NarrationNormalizer::new(config.statement.transfer_markers.iter().cloned()),
            max_password_attempts: config.statement.max_password_attempts,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            fingerprint: FingerprintGenerator::default(),
            layout: LayoutProfile::default(),
            normalizer: NarrationNormalizer::default(),
            max_password_attempts: DEFAULT_MAX_PASSWORD_ATTEMPTS,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline<'a> {
    conn: &'a Connection,
    settings: PipelineSettings,
    rules: &'a mut dyn RuleStore,
    oracle: &'a dyn ClassificationOracle,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        conn: &'a Connection,
        settings: PipelineSettings,
        rules: &'a mut dyn RuleStore,
        oracle: &'a dyn ClassificationOracle,
    ) -> Self {
        Pipeline { conn, settings, rules, oracle }
    }

    /// Ingest one statement document.
    ///
    /// `credentials(attempt)` supplies passwords (1-based attempts). An access
    /// failure is returned as an `AccessError` before anything is parsed or
    /// written.
    pub fn ingest_statement<R, F>(&mut self, reader: &R, bytes: &[u8], credentials: F) -> Result<RunSummary>
    where
        R: DocumentReader + ?Sized,
        F: FnMut(u32) -> Option<String>,
    {
        let mut summary = RunSummary::new(RunSource::Statement);
        summary.inputs_seen = 1;

        let pages = open_with_retry(reader, bytes, self.settings.max_password_attempts, credentials)?;

        let doc = reconstruct_document(&self.settings.layout, &pages);
        summary.pages_skipped = doc.pages_skipped;

        let report = reconcile(&doc.transactions);
        info!(
            pages = doc.pages_seen,
            pages_skipped = doc.pages_skipped,
            "{}",
            report.summary()
        );

        let records: Vec<IntermediateRecord> = doc
            .transactions
            .iter()
            .zip(&report.entries)
            .map(|(pending, entry)| {
                let payee = self.settings.normalizer.normalize(&pending.narration);
                IntermediateRecord {
                    amount: entry.amount,
                    payee: (!payee.is_empty()).then_some(payee),
                    txn_type: Some(entry.txn_type),
                    reference_number: pending.cheque_number.clone(),
                    date: normalize_date(&pending.date),
                }
            })
            .collect();

        self.commit(records, &mut summary)?;
        Ok(summary)
    }

    /// Ingest pre-filtered alert texts, one message per entry
    pub fn ingest_alerts<S: AsRef<str>>(&mut self, messages: &[S]) -> Result<RunSummary> {
        let mut summary = RunSummary::new(RunSource::Alerts);
        summary.inputs_seen = messages.len();

        let parsed = parse_alerts(messages);
        summary.records_skipped = parsed.skipped;

        self.commit(parsed.records, &mut summary)?;
        Ok(summary)
    }

    /// Classify, fingerprint and write, then log the run
    fn commit(&mut self, records: Vec<IntermediateRecord>, summary: &mut RunSummary) -> Result<()> {
        let mut classifier = Classifier::new(&mut *self.rules, self.oracle);

        let entries: Vec<(CanonicalTransaction, String)> = records
            .into_iter()
            .map(|record| {
                let category = classifier.classify(record.payee.as_deref());
                let txn = record.into_canonical(category);
                let fingerprint = self.settings.fingerprint.generate(&txn);
                (txn, fingerprint)
            })
            .collect();

        summary.records_unresolved = entries
            .iter()
            .filter(|(txn, _)| txn.txn_type == TxnType::Unset)
            .count();

        let stats = classifier.stats();
        info!(
            rule_hits = stats.rule_hits,
            oracle_hits = stats.oracle_hits,
            oracle_failures = stats.oracle_failures,
            sip = stats.sip,
            learned = stats.rules_learned,
            "classified {} records",
            entries.len()
        );

        summary.absorb(write_entries(self.conn, &entries));
        insert_run(self.conn, summary)?;

        info!(run_id = %summary.run_id, "{}", summary);
        Ok(())
    }
}
