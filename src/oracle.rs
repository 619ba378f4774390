// 🔮 Classification Oracle - External fallback for merchants no rule knows
//
// The oracle is a black box: one merchant string in, one category name out.
// Anything outside the fixed category set is a contract violation.

use std::fmt;

use crate::rules::Category;

#[derive(Debug)]
pub enum OracleError {
    /// No oracle configured or reachable
    Unavailable(String),

    /// Request failed (network, HTTP status, malformed response)
    Transport(anyhow::Error),

    /// Response was not exactly one known category name
    ContractViolation { output: String },
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Unavailable(why) => write!(f, "classification oracle unavailable: {why}"),
            OracleError::Transport(e) => write!(f, "classification oracle request failed: {e:#}"),
            OracleError::ContractViolation { output } => {
                write!(f, "classification oracle returned '{output}', not a known category")
            }
        }
    }
}

impl std::error::Error for OracleError {}

pub trait ClassificationOracle {
    /// Raw category name for a trimmed merchant string
    fn classify(&self, merchant: &str) -> Result<String, OracleError>;
}

impl<F> ClassificationOracle for F
where
    F: Fn(&str) -> Result<String, OracleError>,
{
    fn classify(&self, merchant: &str) -> Result<String, OracleError> {
        self(merchant)
    }
}

/// Validate an oracle answer against the closed category set
pub fn parse_oracle_output(output: &str) -> Result<Category, OracleError> {
    Category::from_name(output).ok_or_else(|| OracleError::ContractViolation {
        output: output.trim().to_string(),
    })
}

/// Prompt listing the closed category set
pub fn classification_prompt(merchant: &str) -> String {
    let names: Vec<&str> = Category::ALL.iter().map(|c| c.name()).collect();
    format!(
        "Classify the given merchant name into one of these categories:\n{}.\n\
         Return ONLY the category name.\n\nmerchant: {}",
        names.join(", "),
        merchant
    )
}

/// Offline runs: every rule miss ends up uncategorized
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOracle;

impl ClassificationOracle for NoOracle {
    fn classify(&self, _merchant: &str) -> Result<String, OracleError> {
        Err(OracleError::Unavailable("no oracle configured".to_string()))
    }
}

#[cfg(feature = "openai")]
pub use self::openai::OpenAiOracle;

#[cfg(feature = "openai")]
mod openai {
    use anyhow::{anyhow, bail, Context};
    use reqwest::header::AUTHORIZATION;
    use serde::{Deserialize, Serialize};
    use tracing::debug;

    use super::{classification_prompt, ClassificationOracle, OracleError};
    use crate::config::OracleSection;

    /// Chat-completions client (blocking; the pipeline is synchronous)
    pub struct OpenAiOracle {
        client: reqwest::blocking::Client,
        base_url: String,
        model: String,
        temperature: f32,
        api_key: String,
    }

    #[derive(Serialize)]
    struct Msg {
        role: String,
        content: String,
    }

    #[derive(Serialize)]
    struct Req {
        model: String,
        messages: Vec<Msg>,
        temperature: f32,
    }

    #[derive(Deserialize)]
    struct Resp {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: MsgOut,
    }

    #[derive(Deserialize)]
    struct MsgOut {
        content: Option<String>,
    }

    impl OpenAiOracle {
        pub fn from_config(section: &OracleSection) -> anyhow::Result<Self> {
            let api_key = std::env::var(&section.api_key_env)
                .with_context(|| format!("{} is not set", section.api_key_env))?;

            Ok(OpenAiOracle {
                client: reqwest::blocking::Client::new(),
                base_url: section.base_url.trim_end_matches('/').to_string(),
                model: section.model.clone(),
                temperature: section.temperature,
                api_key,
            })
        }

        fn complete(&self, merchant: &str) -> anyhow::Result<String> {
            let body = Req {
                model: self.model.clone(),
                messages: vec![Msg {
                    role: "user".to_string(),
                    content: classification_prompt(merchant),
                }],
                temperature: self.temperature,
            };

            let resp = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .context("openai request")?;

            let status = resp.status();
            if !status.is_success() {
                let txt = resp.text().unwrap_or_default();
                bail!("openai error: {status} {txt}");
            }

            let out: Resp = resp.json().context("parse openai response")?;
            out.choices
                .first()
                .and_then(|c| c.message.content.clone())
                .map(|s| s.trim().to_string())
                .ok_or_else(|| anyhow!("openai response had no content"))
        }
    }

    impl ClassificationOracle for OpenAiOracle {
        fn classify(&self, merchant: &str) -> Result<String, OracleError> {
            let answer = self.complete(merchant).map_err(OracleError::Transport)?;
            debug!(merchant, answer = %answer, "oracle answered");
            Ok(answer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oracle_output_accepts_known() {
        assert_eq!(parse_oracle_output(" Grocery\n").unwrap(), Category::Grocery);
        assert_eq!(parse_oracle_output("petrol").unwrap(), Category::Petrol);
    }

    #[test]
    fn test_parse_oracle_output_rejects_other() {
        let err = parse_oracle_output("Food & Dining").unwrap_err();
        assert!(matches!(err, OracleError::ContractViolation { ref output } if output == "Food & Dining"));
    }

    #[test]
    fn test_prompt_lists_every_category() {
        let prompt = classification_prompt("DMART");
        for c in Category::ALL {
            assert!(prompt.contains(c.name()), "missing {}", c);
        }
        assert!(prompt.ends_with("merchant: DMART"));
    }

    #[test]
    fn test_no_oracle_is_unavailable() {
        assert!(matches!(NoOracle.classify("x"), Err(OracleError::Unavailable(_))));
    }

    #[test]
    fn test_closure_oracle() {
        let oracle = |m: &str| -> Result<String, OracleError> { Ok(format!("{}!", m)) };
        assert_eq!(oracle.classify("hi").unwrap(), "hi!");
    }
}
