use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error};

use crate::pipeline::{RunSource, RunSummary};
use crate::record::{CanonicalTransaction, TxnType};

/// Persisted ledger row; never updated in place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub txn_date: NaiveDate,
    pub amount: Option<Decimal>,
    pub payee: Option<String>,
    pub reference_number: Option<String>,
    pub category: Option<String>,
    pub txn_type: TxnType,
    pub fingerprint: String,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Expenses Table (fingerprint uniqueness is the only dedup mechanism)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            amount NUMERIC,
            payee TEXT,
            reference_no TEXT,
            txn_date DATE NOT NULL,
            category TEXT,
            type TEXT NOT NULL CHECK (type IN ('Debit', 'Credit', 'Unset')),
            fingerprint TEXT UNIQUE NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Ingest Runs Table (one row per pipeline invocation)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ingest_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            source TEXT NOT NULL,
            started_at TEXT NOT NULL,
            inputs_seen INTEGER NOT NULL,
            records_inserted INTEGER NOT NULL,
            records_duplicate INTEGER NOT NULL,
            records_failed INTEGER NOT NULL,
            pages_skipped INTEGER NOT NULL,
            records_unresolved INTEGER NOT NULL,
            records_skipped INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_txn_date ON expenses(txn_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ingest_runs_started ON ingest_runs(started_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// LEDGER WRITER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,

    /// Fingerprint already present; the existing row is left untouched
    Duplicate,

    /// Any other failure, isolated to this record
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub inserted: usize,
    pub duplicate: usize,
    pub failed: usize,
}

impl WriteSummary {
    pub fn record(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted => self.inserted += 1,
            WriteOutcome::Duplicate => self.duplicate += 1,
            WriteOutcome::Failed(_) => self.failed += 1,
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Insert one transaction keyed on its fingerprint.
/// Each call commits on its own; nothing here aborts a batch.
pub fn upsert_with_conflict_policy(
    conn: &Connection,
    txn: &CanonicalTransaction,
    fingerprint: &str,
) -> WriteOutcome {
    let txn_date = match txn.txn_date() {
        Ok(date) => date,
        Err(e) => {
            error!(record = ?txn, error = %e, "rejected ledger write");
            return WriteOutcome::Failed(e.to_string());
        }
    };

    let result = conn.execute(
        "INSERT INTO expenses (
            amount, payee, reference_no, txn_date, category, type, fingerprint
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            txn.amount.map(|a| a.to_string()),
            txn.payee,
            txn.reference_number,
            txn_date.format("%Y-%m-%d").to_string(),
            txn.category.map(|c| c.as_str()),
            txn.txn_type.as_str(),
            fingerprint,
        ],
    );

    match result {
        Ok(_) => WriteOutcome::Inserted,
        Err(e) if is_unique_violation(&e) => {
            debug!(fingerprint, "duplicate skipped");
            WriteOutcome::Duplicate
        }
        Err(e) => {
            error!(record = ?txn, fingerprint, error = %e, "ledger write failed");
            WriteOutcome::Failed(e.to_string())
        }
    }
}

/// Write a batch record by record; any mixture of outcomes is possible
pub fn write_entries(conn: &Connection, entries: &[(CanonicalTransaction, String)]) -> WriteSummary {
    let mut summary = WriteSummary::default();
    for (txn, fingerprint) in entries {
        let outcome = upsert_with_conflict_policy(conn, txn, fingerprint);
        summary.record(&outcome);
    }
    summary
}

// ============================================================================
// QUERIES
// ============================================================================

const ENTRY_COLUMNS: &str =
    "txn_date, CAST(amount AS TEXT), payee, reference_no, category, type, fingerprint";

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let date_str: String = row.get(0)?;
    let amount_str: Option<String> = row.get(1)?;
    let type_str: String = row.get(5)?;

    let txn_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| conversion_error(0, e))?;
    let amount = amount_str
        .map(|s| Decimal::from_str(&s))
        .transpose()
        .map_err(|e| conversion_error(1, e))?;
    let txn_type = TxnType::from_str(&type_str)
        .map_err(|e| conversion_error(5, std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))?;

    Ok(LedgerEntry {
        txn_date,
        amount,
        payee: row.get(2)?,
        reference_number: row.get(3)?,
        category: row.get(4)?,
        txn_type,
        fingerprint: row.get(6)?,
    })
}

/// Entries for one day, in insertion order
pub fn entries_on(conn: &Connection, date: NaiveDate) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM expenses WHERE txn_date = ?1 ORDER BY id"
    ))?;

    let entries = stmt
        .query_map(params![date.format("%Y-%m-%d").to_string()], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

pub fn all_entries(conn: &Connection) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM expenses ORDER BY txn_date DESC, id"
    ))?;

    let entries = stmt
        .query_map([], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;

    Ok(count)
}

/// Totals for one day: debit/credit sums plus debit spend per category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: Option<NaiveDate>,
    pub entries: usize,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub unresolved: usize,
    pub by_category: Vec<(String, Decimal)>,
}

pub fn daily_summary(conn: &Connection, date: NaiveDate) -> Result<DailySummary> {
    let entries = entries_on(conn, date)?;
    let mut summary = DailySummary {
        date: Some(date),
        entries: entries.len(),
        ..DailySummary::default()
    };

    for entry in &entries {
        let amount = entry.amount.unwrap_or_default();
        match entry.txn_type {
            TxnType::Debit => {
                summary.total_debits += amount;
                let category = entry.category.clone().unwrap_or_default();
                match summary.by_category.iter_mut().find(|(c, _)| *c == category) {
                    Some((_, total)) => *total += amount,
                    None => summary.by_category.push((category, amount)),
                }
            }
            TxnType::Credit => summary.total_credits += amount,
            TxnType::Unset => summary.unresolved += 1,
        }
    }

    Ok(summary)
}

/// Export the whole ledger as CSV; returns the number of rows written
pub fn export_csv(conn: &Connection, path: &Path) -> Result<usize> {
    let entries = all_entries(conn)?;
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    for entry in &entries {
        wtr.serialize(entry).context("Failed to write CSV row")?;
    }
    wtr.flush()?;

    Ok(entries.len())
}

// ============================================================================
// INGEST RUNS (audit trail)
// ============================================================================

pub fn insert_run(conn: &Connection, run: &RunSummary) -> Result<()> {
    conn.execute(
        "INSERT INTO ingest_runs (
            run_id, source, started_at, inputs_seen, records_inserted, records_duplicate,
            records_failed, pages_skipped, records_unresolved, records_skipped
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id,
            run.source.as_str(),
            run.started_at.to_rfc3339(),
            run.inputs_seen as i64,
            run.records_inserted as i64,
            run.records_duplicate as i64,
            run.records_failed as i64,
            run.pages_skipped as i64,
            run.records_unresolved as i64,
            run.records_skipped as i64,
        ],
    )
    .context("Failed to record ingest run")?;

    Ok(())
}

/// Most recent runs first
pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunSummary>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, source, started_at, inputs_seen, records_inserted, records_duplicate,
                records_failed, pages_skipped, records_unresolved, records_skipped
         FROM ingest_runs
         ORDER BY started_at DESC, id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map(params![limit as i64], |row| {
            let source_str: String = row.get(1)?;
            let started_str: String = row.get(2)?;
            let count = |idx: usize| -> rusqlite::Result<usize> {
                let n: i64 = row.get(idx)?;
                Ok(n.max(0) as usize)
            };

            Ok(RunSummary {
                run_id: row.get(0)?,
                source: RunSource::from_str(&source_str).map_err(|e| {
                    conversion_error(1, std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
                })?,
                started_at: DateTime::parse_from_rfc3339(&started_str)
                    .map_err(|e| conversion_error(2, e))?
                    .with_timezone(&Utc),
                inputs_seen: count(3)?,
                records_inserted: count(4)?,
                records_duplicate: count(5)?,
                records_failed: count(6)?,
                pages_skipped: count(7)?,
                records_unresolved: count(8)?,
                records_skipped: count(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}
