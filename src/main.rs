use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use expense_ledger::config::DEFAULT_CONFIG_FILE;
use expense_ledger::{
    daily_summary, export_csv, init_config, load_config, recent_runs, setup_database, verify_count,
    ClassificationOracle, Config, DocumentReader, JsonRuleStore, NoOracle, OracleProvider,
    PdftotextReader, Pipeline, PipelineSettings, RunSummary, TextDocumentReader,
};

#[derive(Parser, Debug)]
#[command(name = "expense-ledger", version, about = "Bank statement and alert ingestion into a deduplicated expense ledger")]
struct Cli {
    /// Config file (defaults apply when it does not exist)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a statement PDF and write its transactions to the ledger
    IngestStatement {
        file: PathBuf,

        /// Password to try (repeatable, tried in order; prompts after these run out)
        #[arg(long = "password")]
        passwords: Vec<String>,

        /// FILE is already-extracted layout text, not a PDF
        #[arg(long)]
        text: bool,
    },

    /// Parse transaction alerts (one message per file, or a .json array of strings)
    IngestAlerts {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show one day's ledger totals and the latest runs
    Summary {
        /// Day to summarize, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of recent runs to list
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },

    /// Export the whole ledger as CSV
    Export { csv: PathBuf },

    /// Write a config file with the default settings
    InitConfig,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::InitConfig => {
            if init_config(&cli.config)? {
                println!("✓ Wrote default config to {}", cli.config.display());
            } else {
                println!("Config already exists: {}", cli.config.display());
            }
        }

        Command::IngestStatement { file, passwords, text } => {
            let (config, conn) = open_ledger(&cli.config)?;
            let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let reader: Box<dyn DocumentReader> = if text {
                Box::new(TextDocumentReader)
            } else {
                Box::new(PdftotextReader::locate(&config.statement.extractor)?)
            };

            let oracle = build_oracle(&config);
            let mut rules = JsonRuleStore::open(&config.rules.path)?;
            let mut pipeline =
                Pipeline::new(&conn, PipelineSettings::from_config(&config), &mut rules, oracle.as_ref());

            let run = pipeline.ingest_statement(reader.as_ref(), &bytes, credential_provider(passwords))?;
            print_run(&run);
        }

        Command::IngestAlerts { files } => {
            let (config, conn) = open_ledger(&cli.config)?;
            let messages = read_messages(&files)?;

            let oracle = build_oracle(&config);
            let mut rules = JsonRuleStore::open(&config.rules.path)?;
            let mut pipeline =
                Pipeline::new(&conn, PipelineSettings::from_config(&config), &mut rules, oracle.as_ref());

            let run = pipeline.ingest_alerts(messages.as_slice())?;
            print_run(&run);
        }

        Command::Summary { date, runs } => {
            let (_, conn) = open_ledger(&cli.config)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let summary = daily_summary(&conn, date)?;

            println!("📅 {} ({} entries, {} in ledger)", date, summary.entries, verify_count(&conn)?);
            println!("   Debits:  {}", summary.total_debits);
            println!("   Credits: {}", summary.total_credits);
            if summary.unresolved > 0 {
                println!("   Unresolved: {}", summary.unresolved);
            }
            for (category, total) in &summary.by_category {
                println!("   {:<14} {}", category, total);
            }

            let recent = recent_runs(&conn, runs)?;
            if !recent.is_empty() {
                println!("\n🕑 Recent runs");
                for run in &recent {
                    println!("   {} {}", run.started_at.format("%Y-%m-%d %H:%M"), run);
                }
            }
        }

        Command::Export { csv } => {
            let (_, conn) = open_ledger(&cli.config)?;
            let written = export_csv(&conn, &csv)?;
            println!("✓ Exported {} entries to {}", written, csv.display());
        }
    }

    Ok(())
}

/// Load config and open (creating if needed) the ledger it points at
fn open_ledger(config_path: &Path) -> Result<(Config, Connection)> {
    let config = load_config(config_path)?;
    let path = &config.database.path;
    let conn = Connection::open(path).with_context(|| format!("opening ledger {}", path.display()))?;
    setup_database(&conn)?;
    Ok((config, conn))
}

fn build_oracle(config: &Config) -> Box<dyn ClassificationOracle> {
    match config.oracle.provider {
        OracleProvider::None => Box::new(NoOracle),
        #[cfg(feature = "openai")]
        OracleProvider::OpenAi => match expense_ledger::OpenAiOracle::from_config(&config.oracle) {
            Ok(oracle) => Box::new(oracle),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "oracle disabled, rule misses stay uncategorized");
                Box::new(NoOracle)
            }
        },
        #[cfg(not(feature = "openai"))]
        OracleProvider::OpenAi => {
            warn!("built without the openai feature, rule misses stay uncategorized");
            Box::new(NoOracle)
        }
    }
}

/// Flag passwords first; with none given, try an empty password, then prompt
fn credential_provider(passwords: Vec<String>) -> impl FnMut(u32) -> Option<String> {
    let try_empty_first = passwords.is_empty();
    let mut supplied = passwords.into_iter();
    let interactive = io::stdin().is_terminal();

    move |attempt| {
        if let Some(pw) = supplied.next() {
            return Some(pw);
        }
        if try_empty_first && attempt == 1 {
            return Some(String::new());
        }
        if !interactive {
            return None;
        }
        prompt(&format!("Statement password (attempt {})", attempt)).ok()
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

fn read_messages(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut messages = Vec::new();
    for path in files {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            let batch: Vec<String> = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON array of strings", path.display()))?;
            messages.extend(batch);
        } else {
            messages.push(content);
        }
    }
    if messages.is_empty() {
        bail!("no alert messages found");
    }
    Ok(messages)
}

fn print_run(run: &RunSummary) {
    println!("✓ Inserted: {}", run.records_inserted);
    println!("✓ Skipped duplicates: {}", run.records_duplicate);
    if run.records_failed > 0 {
        println!("✗ Failed: {}", run.records_failed);
    }
    if run.records_unresolved > 0 {
        println!("⚠ Unresolved type: {}", run.records_unresolved);
    }
    if run.pages_skipped > 0 {
        println!("⚠ Pages skipped: {}", run.pages_skipped);
    }
    if run.records_skipped > 0 {
        println!("⚠ Messages skipped: {}", run.records_skipped);
    }
    println!("Run {}", run.run_id);
}
