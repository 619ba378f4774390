// 🏷️ Category Classifier - Rule table first, oracle fallback, learn on success
//
// Resolution order:
//   1. empty / absent payee   → SIP (nothing else consulted)
//   2. rule table (in order)  → first category whose keyword is a substring
//   3. oracle (once)          → learn lowercased payee, persist immediately
//   4. oracle failed          → Uncategorized, nothing learned

use tracing::{debug, error, warn};

use crate::oracle::{parse_oracle_output, ClassificationOracle};
use crate::rules::{CategoryAssignment, RuleStore};

/// How each payee in a run was resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    pub sip: usize,
    pub rule_hits: usize,
    pub oracle_hits: usize,
    pub oracle_failures: usize,
    pub rules_learned: usize,
}

pub struct Classifier<'a> {
    rules: &'a mut dyn RuleStore,
    oracle: &'a dyn ClassificationOracle,
    stats: ClassifierStats,
}

impl<'a> Classifier<'a> {
    pub fn new(rules: &'a mut dyn RuleStore, oracle: &'a dyn ClassificationOracle) -> Self {
        Classifier { rules, oracle, stats: ClassifierStats::default() }
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    pub fn classify(&mut self, payee: Option<&str>) -> CategoryAssignment {
        let payee = match payee.map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => {
                self.stats.sip += 1;
                return CategoryAssignment::Sip;
            }
        };

        if let Some(category) = self.rules.lookup(payee) {
            self.stats.rule_hits += 1;
            return CategoryAssignment::Known(category);
        }

        let answer = self
            .oracle
            .classify(payee)
            .and_then(|raw| parse_oracle_output(&raw));

        let category = match answer {
            Ok(category) => category,
            Err(e) => {
                warn!(payee, error = %e, "oracle fallback failed, leaving uncategorized");
                self.stats.oracle_failures += 1;
                return CategoryAssignment::Uncategorized;
            }
        };
        self.stats.oracle_hits += 1;

        let keyword = payee.to_lowercase();
        if self.rules.learn(category, &keyword) {
            self.stats.rules_learned += 1;
            debug!(keyword = %keyword, category = %category, "learned rule");

            // A lost write only costs one repeat oracle call next time
            if let Err(e) = self.rules.persist() {
                error!(error = %format!("{e:#}"), "failed to persist rule table");
            }
        }

        CategoryAssignment::Known(category)
    }
}
