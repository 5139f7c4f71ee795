//! Per-trade questionnaires and answer validation.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use lvkit_shared::{AnswerKind, AnswerSet, LvkitError, QuestionDefinition, Result, ValidationResult};

/// Built-in question table.
const BUILTIN_QUESTIONS: &str = include_str!("../data/questions.toml");

/// Accepted `yes_no` string tokens (English and German).
const YES_NO_TOKENS: [&str; 4] = ["yes", "no", "ja", "nein"];

#[derive(Debug, Deserialize)]
struct QuestionTable {
    #[serde(default, rename = "trade")]
    trades: Vec<TradeQuestions>,
}

#[derive(Debug, Deserialize)]
struct TradeQuestions {
    id: String,
    #[serde(default)]
    questions: Vec<QuestionDefinition>,
}

/// Static question lists keyed by trade id.
#[derive(Debug, Clone, Default)]
pub struct QuestionCatalog {
    by_trade: HashMap<String, Vec<QuestionDefinition>>,
}

impl QuestionCatalog {
    /// The question table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_QUESTIONS)
    }

    /// Load a question table from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LvkitError::io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| LvkitError::parse(format!("{}: {e}", path.display())))
    }

    /// Parse and check a question table.
    pub fn from_toml(content: &str) -> Result<Self> {
        let table: QuestionTable = toml::from_str(content)
            .map_err(|e| LvkitError::parse(format!("invalid question table: {e}")))?;

        let mut by_trade = HashMap::new();
        for trade in table.trades {
            check_questions(&trade.id, &trade.questions)?;
            if by_trade.insert(trade.id.clone(), trade.questions).is_some() {
                return Err(LvkitError::parse(format!(
                    "trade '{}' defined twice in question table",
                    trade.id
                )));
            }
        }

        Ok(Self { by_trade })
    }

    /// Questions of `trade` in asking order; empty for unknown trades.
    pub fn get_questions(&self, trade: &str) -> &[QuestionDefinition] {
        self.by_trade.get(trade).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check `answers` against the questions of `trade`.
    ///
    /// Never fails: every problem becomes a message in the result. Answers
    /// for ids the trade does not ask are reported as warnings only.
    pub fn validate(&self, trade: &str, answers: &AnswerSet) -> ValidationResult {
        let questions = self.get_questions(trade);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for question in questions {
            let answer = answers.get(&question.id).filter(|v| !is_absent(v));

            let Some(answer) = answer else {
                if question.required {
                    errors.push(format!("Frage '{}' ist erforderlich", question.prompt));
                }
                continue;
            };

            check_answer(question, answer, &mut errors);
        }

        let known: HashSet<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        for id in answers.keys().filter(|id| !known.contains(id.as_str())) {
            warnings.push(format!("Unbekannte Frage-ID '{id}' wird ignoriert"));
        }

        ValidationResult::from_messages(errors, warnings)
    }

    /// Plain-text summary of the answered questions of `trade`.
    pub fn summarize(&self, trade: &str, answers: &AnswerSet) -> String {
        let mut lines = vec![format!("Zusammenfassung {}:", trade.to_uppercase())];

        for question in self.get_questions(trade) {
            if let Some(answer) = answers.get(&question.id).filter(|v| !is_absent(v)) {
                lines.push(format!("- {}: {}", question.prompt, display_answer(answer)));
            }
        }

        lines.join("\n")
    }
}

/// Reject duplicate ids and option lists that disagree with the answer kind.
fn check_questions(trade: &str, questions: &[QuestionDefinition]) -> Result<()> {
    let mut seen = HashSet::new();

    for q in questions {
        if !seen.insert(q.id.as_str()) {
            return Err(LvkitError::parse(format!(
                "duplicate question id '{}' in trade '{trade}'",
                q.id
            )));
        }
        if q.answer_kind.needs_options() == q.options.is_empty() {
            return Err(LvkitError::parse(format!(
                "question '{}' in trade '{trade}': options {} for kind {:?}",
                q.id,
                if q.options.is_empty() { "missing" } else { "not allowed" },
                q.answer_kind
            )));
        }
    }

    Ok(())
}

/// Missing-equivalent values: null, blank strings, empty lists.
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn check_answer(question: &QuestionDefinition, answer: &Value, errors: &mut Vec<String>) {
    match question.answer_kind {
        AnswerKind::Number => {
            if parse_number(answer).is_none() {
                errors.push(format!("'{}' ist keine gültige Zahl", display_answer(answer)));
            }
        }
        AnswerKind::SingleChoice => {
            if !is_option(question, answer) {
                errors.push(format!("'{}' ist keine gültige Option", display_answer(answer)));
            }
        }
        AnswerKind::MultipleChoice => match answer {
            Value::Array(items) => {
                for item in items.iter().filter(|item| !is_option(question, item)) {
                    errors.push(format!("'{}' ist keine gültige Option", display_answer(item)));
                }
            }
            _ => errors.push("Mehrfachauswahl erwartet eine Liste".to_string()),
        },
        AnswerKind::YesNo => {
            let accepted = match answer {
                Value::Bool(_) => true,
                Value::String(s) => YES_NO_TOKENS.contains(&s.as_str()),
                _ => false,
            };
            if !accepted {
                errors.push(format!(
                    "'{}' ist keine gültige Ja/Nein-Antwort",
                    display_answer(answer)
                ));
            }
        }
    }
}

/// A JSON number or a string holding a finite real number.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn is_option(question: &QuestionDefinition, value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| question.options.iter().any(|o| o == s))
}

/// Strings without quotes, lists comma-joined, booleans as ja/nein.
fn display_answer(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "ja".to_string(),
        Value::Bool(false) => "nein".to_string(),
        Value::Array(items) => items.iter().map(display_answer).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
