//! Trade detection and per-trade questionnaires.
//!
//! Both rule tables ship compiled into the binary and can be replaced
//! through the `[rules]` config section.

pub mod questions;
pub mod trades;

use std::path::Path;

use tracing::info;

use lvkit_shared::{Result, RulesConfig};

pub use questions::{QuestionCatalog, parse_number};
pub use trades::{TradeRegistry, TradeRule};

/// The trade and question tables used by one process.
#[derive(Debug, Clone)]
pub struct Rules {
    pub trades: TradeRegistry,
    pub questions: QuestionCatalog,
}

impl Rules {
    /// Built-in tables, each overridable by a file from `config`.
    pub fn load(config: &RulesConfig) -> Result<Self> {
        let trades = match &config.trades_file {
            Some(path) => {
                info!(path = %path, "loading trade table");
                TradeRegistry::from_file(Path::new(path))?
            }
            None => TradeRegistry::builtin()?,
        };

        let questions = match &config.questions_file {
            Some(path) => {
                info!(path = %path, "loading question table");
                QuestionCatalog::from_file(Path::new(path))?
            }
            None => QuestionCatalog::builtin()?,
        };

        Ok(Self { trades, questions })
    }

    /// The built-in tables.
    pub fn builtin() -> Result<Self> {
        Self::load(&RulesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_cover_default_trades() {
        let rules = Rules::builtin().unwrap();
        for trade in rules.trades.defaults() {
            assert!(
                !rules.questions.get_questions(trade).is_empty(),
                "default trade {trade} has no questions"
            );
        }
    }

    #[test]
    fn rule_files_override_builtins() {
        let dir = std::env::temp_dir().join(format!("lvkit-rules-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let trades_file = dir.join("trades.toml");
        std::fs::write(
            &trades_file,
            "defaults = [\"dach\"]\n[[trade]]\nid = \"dach\"\ntitle = \"Dacharbeiten\"\nkeywords = [\"dach\"]\n",
        )
        .unwrap();

        let rules = Rules::load(&RulesConfig {
            trades_file: Some(trades_file.display().to_string()),
            questions_file: None,
        })
        .unwrap();
        assert_eq!(rules.trades.detect_trades("Garten"), vec!["dach"]);
        assert_eq!(rules.questions.get_questions("fliesen").len(), 5);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_rule_file_is_an_error() {
        let result = Rules::load(&RulesConfig {
            trades_file: None,
            questions_file: Some("/nonexistent/questions.toml".into()),
        });
        assert!(result.is_err());
    }
}
