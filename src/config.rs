use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::DEFAULT_MAX_PASSWORD_ATTEMPTS;
use crate::fingerprint::{KeyField, DEFAULT_KEY_FIELDS};
use crate::merchant::DEFAULT_TRANSFER_MARKERS;
use crate::parser::LayoutProfile;

pub const DEFAULT_CONFIG_FILE: &str = "expense-ledger.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSection,
    pub rules: RulesSection,
    pub fingerprint: FingerprintSection,
    pub statement: StatementSection,
    pub oracle: OracleSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { path: PathBuf::from("ledger.db") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesSection {
    pub path: PathBuf,
}

impl Default for RulesSection {
    fn default() -> Self {
        Self { path: PathBuf::from("rules.json") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintSection {
    /// Ordered key fields; must be identical for every source
    pub keys: Vec<KeyField>,
}

impl Default for FingerprintSection {
    fn default() -> Self {
        Self { keys: DEFAULT_KEY_FIELDS.to_vec() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementSection {
    /// PDF-to-text extractor binary (poppler's pdftotext)
    pub extractor: String,
    pub max_password_attempts: u32,
    pub transfer_markers: Vec<String>,
    pub terminal_markers: Vec<String>,
    pub boilerplate_markers: Vec<String>,
}

impl Default for StatementSection {
    fn default() -> Self {
        let layout = LayoutProfile::hdfc();
        Self {
            extractor: "pdftotext".to_string(),
            max_password_attempts: DEFAULT_MAX_PASSWORD_ATTEMPTS,
            transfer_markers: DEFAULT_TRANSFER_MARKERS.iter().map(|m| m.to_string()).collect(),
            terminal_markers: layout.terminal_markers,
            boilerplate_markers: layout.boilerplate_markers,
        }
    }
}

impl StatementSection {
    pub fn layout(&self) -> LayoutProfile {
        LayoutProfile {
            terminal_markers: self.terminal_markers.clone(),
            boilerplate_markers: self.boilerplate_markers.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    OpenAi,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub provider: OracleProvider,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key (the key never lives in the file)
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            provider: OracleProvider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.fingerprint.keys.is_empty() {
            bail!("[fingerprint] keys must list at least one field");
        }
        let mut seen = Vec::new();
        for key in &self.fingerprint.keys {
            if seen.contains(key) {
                bail!("[fingerprint] keys lists '{}' twice", key.as_str());
            }
            seen.push(*key);
        }
        if self.statement.max_password_attempts == 0 {
            bail!("[statement] max_password_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Load a config file; a missing file yields the defaults
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Write the default config unless one already exists; returns true if written
pub fn init_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config(path, &Config::default())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [database]
            path = "/tmp/x.db"

            [fingerprint]
            keys = ["reference_number", "date"]

            [oracle]
            provider = "none"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.fingerprint.keys, vec![KeyField::ReferenceNumber, KeyField::Date]);
        assert_eq!(cfg.oracle.provider, OracleProvider::None);
        assert_eq!(cfg.statement.max_password_attempts, 3);
        assert_eq!(cfg.rules.path, PathBuf::from("rules.json"));
    }

    #[test]
    fn test_unknown_key_field_rejected() {
        let parsed: std::result::Result<Config, _> = toml::from_str(
            r#"
            [fingerprint]
            keys = ["date", "merchant_colour"]
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_duplicate_key_field_rejected() {
        let mut cfg = Config::default();
        cfg.fingerprint.keys = vec![KeyField::Date, KeyField::Date];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_init_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        assert!(init_config(&path).unwrap());
        assert!(!init_config(&path).unwrap());
        assert_eq!(load_config(&path).unwrap(), Config::default());
    }
}
