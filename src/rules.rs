// 🏷️ Category Rules - Rules as Data
// Keyword table mapping merchant names to a fixed set of categories.
// Order matters: the first category whose keyword matches wins.

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// CATEGORY (closed set)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Person,
    Petrol,
    Grocery,
    Clothing,
    Salon,
    Hospital,
    Sports,
    Others,
    Rent,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Food,
        Category::Person,
        Category::Petrol,
        Category::Grocery,
        Category::Clothing,
        Category::Salon,
        Category::Hospital,
        Category::Sports,
        Category::Others,
        Category::Rent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Person => "Person",
            Category::Petrol => "Petrol",
            Category::Grocery => "Grocery",
            Category::Clothing => "Clothing",
            Category::Salon => "Salon",
            Category::Hospital => "Hospital",
            Category::Sports => "Sports",
            Category::Others => "Others",
            Category::Rent => "Rent",
        }
    }

    /// Case-insensitive lookup of a category by its name
    pub fn from_name(name: &str) -> Option<Category> {
        let name = name.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// CATEGORY ASSIGNMENT (what a record ends up labelled with)
// ============================================================================

pub const SIP_LABEL: &str = "SIP";
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CategoryAssignment {
    /// Resolved by a rule or by the oracle
    Known(Category),

    /// No payee at all: systematic-investment default
    Sip,

    /// Oracle failed or broke its contract
    Uncategorized,
}

impl CategoryAssignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryAssignment::Known(c) => c.name(),
            CategoryAssignment::Sip => SIP_LABEL,
            CategoryAssignment::Uncategorized => UNCATEGORIZED_LABEL,
        }
    }
}

impl fmt::Display for CategoryAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryAssignment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim() == SIP_LABEL {
            return Ok(CategoryAssignment::Sip);
        }
        if s.trim() == UNCATEGORIZED_LABEL {
            return Ok(CategoryAssignment::Uncategorized);
        }
        Category::from_name(s)
            .map(CategoryAssignment::Known)
            .ok_or_else(|| anyhow!("unknown category label: {}", s))
    }
}

impl From<CategoryAssignment> for String {
    fn from(value: CategoryAssignment) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for CategoryAssignment {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

/// Ordered mapping category -> lowercase keywords (insertion order preserved)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleTable {
    entries: Vec<(Category, Vec<String>)>,
}

impl RuleTable {
    /// Create an empty table
    pub fn new() -> Self {
        RuleTable { entries: Vec::new() }
    }

    /// Table used when no rule file exists yet
    pub fn with_defaults() -> Self {
        let entries = [
            Category::Food,
            Category::Petrol,
            Category::Grocery,
            Category::Person,
            Category::Rent,
            Category::Others,
        ]
        .into_iter()
        .map(|c| (c, Vec::new()))
        .collect();

        RuleTable { entries }
    }

    /// Build a table from (category, keywords) pairs, keeping their order
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Category, Vec<K>)>,
        K: AsRef<str>,
    {
        let mut table = RuleTable::new();
        for (category, keywords) in entries {
            table.ensure_category(category);
            for kw in keywords {
                table.learn(category, kw.as_ref());
            }
        }
        table
    }

    /// First category (table order) with a keyword contained in the payee
    pub fn lookup(&self, payee: &str) -> Option<Category> {
        let payee_lower = payee.to_lowercase();

        self.entries
            .iter()
            .find(|(_, keywords)| {
                keywords
                    .iter()
                    .any(|kw| !kw.is_empty() && payee_lower.contains(kw.as_str()))
            })
            .map(|(category, _)| *category)
    }

    /// Append a lowercase keyword under a category.
    /// Returns false when the keyword was empty or already present.
    pub fn learn(&mut self, category: Category, keyword: &str) -> bool {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return false;
        }

        let idx = self.ensure_category(category);
        let keywords = &mut self.entries[idx].1;
        if keywords.contains(&keyword) {
            return false;
        }
        keywords.push(keyword);
        true
    }

    /// Keywords registered for a category (empty if the category is absent)
    pub fn keywords(&self, category: Category) -> &[String] {
        self.entries
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, kws)| kws.as_slice())
            .unwrap_or(&[])
    }

    /// Categories in table order
    pub fn categories(&self) -> Vec<Category> {
        self.entries.iter().map(|(c, _)| *c).collect()
    }

    pub fn keyword_count(&self) -> usize {
        self.entries.iter().map(|(_, kws)| kws.len()).sum()
    }

    fn ensure_category(&mut self, category: Category) -> usize {
        if let Some(idx) = self.entries.iter().position(|(c, _)| *c == category) {
            return idx;
        }
        // Categories learned for the first time go to the end so existing
        // precedence is untouched.
        self.entries.push((category, Vec::new()));
        self.entries.len() - 1
    }

    /// Parse the persisted JSON object `{ "Food": ["swiggy", ...], ... }`
    pub fn from_json_str(content: &str) -> Result<Self> {
        let map: Map<String, Value> =
            serde_json::from_str(content).context("Failed to parse rules JSON")?;

        let mut table = RuleTable::new();
        for (name, value) in map {
            let category = Category::from_name(&name)
                .ok_or_else(|| anyhow!("Unknown category in rules file: {}", name))?;

            let keywords = match value {
                Value::Array(items) => items,
                other => bail!("Keywords for {} must be an array, got {}", name, other),
            };

            table.ensure_category(category);
            for item in keywords {
                match item {
                    Value::String(kw) => {
                        table.learn(category, &kw);
                    }
                    other => bail!("Keyword under {} is not a string: {}", name, other),
                }
            }
        }

        Ok(table)
    }

    /// Serialize back to the persisted JSON object, preserving order
    pub fn to_json_string(&self) -> Result<String> {
        let mut map = Map::new();
        for (category, keywords) in &self.entries {
            map.insert(
                category.name().to_string(),
                Value::Array(keywords.iter().cloned().map(Value::String).collect()),
            );
        }
        serde_json::to_string_pretty(&Value::Object(map)).context("Failed to serialize rules")
    }
}

// ============================================================================
// RULE STORE (capability passed into the classifier)
// ============================================================================

pub trait RuleStore {
    /// Reload the table wholesale from backing storage
    fn load(&mut self) -> Result<()>;

    /// First matching category for a payee, if any
    fn lookup(&self, payee: &str) -> Option<Category>;

    /// Record a new keyword in memory; returns false if nothing changed
    fn learn(&mut self, category: Category, keyword: &str) -> bool;

    /// Rewrite the whole table to backing storage
    fn persist(&self) -> Result<()>;

    /// Current in-memory table
    fn table(&self) -> &RuleTable;
}

/// Rule store backed by a JSON file, rewritten on every persist
pub struct JsonRuleStore {
    path: PathBuf,
    table: RuleTable,
}

impl JsonRuleStore {
    /// Open a store and load it; a missing file yields the default table
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut store = JsonRuleStore {
            path: path.as_ref().to_path_buf(),
            table: RuleTable::new(),
        };
        store.load()?;
        Ok(store)
    }
}

/// Replace `path` with `contents` via a sibling temp file and a rename, so a
/// crash mid-write leaves the previous file intact.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .with_context(|| format!("Failed to write temp file for {:?}", path))?;

    // On failure the temp file is dropped (and removed) with the error
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}

impl RuleStore for JsonRuleStore {
    fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            self.table = RuleTable::with_defaults();
            return Ok(());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read rules file: {:?}", self.path))?;
        self.table = RuleTable::from_json_str(&content)
            .with_context(|| format!("Invalid rules file: {:?}", self.path))?;
        Ok(())
    }

    fn lookup(&self, payee: &str) -> Option<Category> {
        self.table.lookup(payee)
    }

    fn learn(&mut self, category: Category, keyword: &str) -> bool {
        self.table.learn(category, keyword)
    }

    fn persist(&self) -> Result<()> {
        let json = self.table.to_json_string()?;
        write_atomically(&self.path, &json)
            .with_context(|| format!("Failed to write rules file: {:?}", self.path))
    }

    fn table(&self) -> &RuleTable {
        &self.table
    }
}

/// In-memory rule store; `persist` snapshots the table instead of writing a file
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    seed: RuleTable,
    table: RuleTable,
    persisted: std::cell::RefCell<Vec<RuleTable>>,
}

impl MemoryRuleStore {
    pub fn new(table: RuleTable) -> Self {
        MemoryRuleStore {
            seed: table.clone(),
            table,
            persisted: std::cell::RefCell::new(Vec::new()),
        }
    }

    /// Number of times the table was persisted
    pub fn persist_count(&self) -> usize {
        self.persisted.borrow().len()
    }

    /// Most recently persisted snapshot
    pub fn last_persisted(&self) -> Option<RuleTable> {
        self.persisted.borrow().last().cloned()
    }
}

impl RuleStore for MemoryRuleStore {
    fn load(&mut self) -> Result<()> {
        self.table = self.last_persisted().unwrap_or_else(|| self.seed.clone());
        Ok(())
    }

    fn lookup(&self, payee: &str) -> Option<Category> {
        self.table.lookup(payee)
    }

    fn learn(&mut self, category: Category, keyword: &str) -> bool {
        self.table.learn(category, keyword)
    }

    fn persist(&self) -> Result<()> {
        self.persisted.borrow_mut().push(self.table.clone());
        Ok(())
    }

    fn table(&self) -> &RuleTable {
        &self.table
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive_substring() {
        let table = RuleTable::from_entries(vec![
            (Category::Food, vec!["swiggy", "zomato"]),
            (Category::Petrol, vec!["hp petrol"]),
        ]);

        assert_eq!(table.lookup("SWIGGY LIMITED"), Some(Category::Food));
        assert_eq!(table.lookup("Hp Petrol Pump 22"), Some(Category::Petrol));
        assert_eq!(table.lookup("AMAZON"), None);
    }

    #[test]
    fn test_first_category_wins() {
        // "mart" matches both; Grocery comes first in table order
        let table = RuleTable::from_entries(vec![
            (Category::Grocery, vec!["mart"]),
            (Category::Clothing, vec!["fashion mart"]),
        ]);

        assert_eq!(table.lookup("FASHION MART"), Some(Category::Grocery));
    }

    #[test]
    fn test_learn_appends_lowercase_once() {
        let mut table = RuleTable::with_defaults();

        assert!(table.learn(Category::Food, "  Dosa Corner "));
        assert!(!table.learn(Category::Food, "DOSA CORNER"));
        assert!(!table.learn(Category::Food, "   "));

        assert_eq!(table.keywords(Category::Food), &["dosa corner".to_string()]);
    }

    #[test]
    fn test_learn_new_category_goes_last() {
        let mut table = RuleTable::with_defaults();
        table.learn(Category::Salon, "looks salon");

        let categories = table.categories();
        assert_eq!(categories.last(), Some(&Category::Salon));
        assert_eq!(categories[0], Category::Food);
    }

    #[test]
    fn test_json_preserves_order() {
        let json = r#"{
            "Rent": ["landlord"],
            "Food": ["swiggy", "cafe"],
            "Person": []
        }"#;

        let table = RuleTable::from_json_str(json).unwrap();
        assert_eq!(
            table.categories(),
            vec![Category::Rent, Category::Food, Category::Person]
        );

        let reparsed = RuleTable::from_json_str(&table.to_json_string().unwrap()).unwrap();
        assert_eq!(reparsed, table);
        assert_eq!(
            reparsed.keywords(Category::Food),
            &["swiggy".to_string(), "cafe".to_string()]
        );
    }

    #[test]
    fn test_json_rejects_unknown_category() {
        let err = RuleTable::from_json_str(r#"{"Travel": ["irctc"]}"#).unwrap_err();
        assert!(err.to_string().contains("Travel"));
    }

    #[test]
    fn test_json_store_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let mut store = JsonRuleStore::open(&path).unwrap();
        assert_eq!(store.table(), &RuleTable::with_defaults());

        store.learn(Category::Grocery, "dmart");
        store.persist().unwrap();

        let reopened = JsonRuleStore::open(&path).unwrap();
        assert_eq!(reopened.lookup("DMART AVENUE"), Some(Category::Grocery));
        assert_eq!(reopened.table(), store.table());
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_interrupted_persist_keeps_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let mut store = JsonRuleStore::open(&path).unwrap();
        store.learn(Category::Food, "swiggy");
        store.learn(Category::Food, "zomato");
        store.persist().unwrap();
        assert_eq!(dir_entries(dir.path()), vec!["rules.json".to_string()]);

        // A crash mid-write leaves at most a truncated sibling, never a truncated target
        let full = store.table().to_json_string().unwrap();
        fs::write(dir.path().join(".tmpcrash"), &full[..full.len() / 2]).unwrap();

        let reopened = JsonRuleStore::open(&path).unwrap();
        assert_eq!(reopened.table(), store.table());
        assert_eq!(reopened.lookup("ZOMATO"), Some(Category::Food));
    }

    #[test]
    fn test_failed_persist_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        // Renaming a file over a non-empty directory fails
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let mut store = JsonRuleStore {
            path: path.clone(),
            table: RuleTable::with_defaults(),
        };
        store.learn(Category::Rent, "landlord");

        assert!(store.persist().is_err());
        assert_eq!(dir_entries(dir.path()), vec!["rules.json".to_string()]);
        assert!(path.is_dir());
    }

    #[test]
    fn test_memory_store_reload_sees_persisted() {
        let mut store = MemoryRuleStore::new(RuleTable::with_defaults());
        store.learn(Category::Sports, "decathlon");
        store.load().unwrap();
        // Not persisted yet: reload drops the learned keyword
        assert_eq!(store.lookup("decathlon"), None);

        store.learn(Category::Sports, "decathlon");
        store.persist().unwrap();
        store.load().unwrap();
        assert_eq!(store.lookup("DECATHLON"), Some(Category::Sports));
        assert_eq!(store.persist_count(), 1);
    }

    #[test]
    fn test_assignment_labels() {
        assert_eq!(CategoryAssignment::Known(Category::Rent).as_str(), "Rent");
        assert_eq!(CategoryAssignment::Sip.as_str(), "SIP");
        assert_eq!(
            "Uncategorized".parse::<CategoryAssignment>().unwrap(),
            CategoryAssignment::Uncategorized
        );
        assert_eq!(
            "grocery".parse::<CategoryAssignment>().unwrap(),
            CategoryAssignment::Known(Category::Grocery)
        );
    }
}
