//! Core domain types shared by the catalog, questionnaire and LV crates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A priced line-item template belonging to one trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Full source line the price was found on.
    pub description: String,
    /// Parsed amount.
    pub price: Decimal,
    /// Billing unit. Source documents carry none, so parsing yields `Stk`.
    pub unit: String,
    /// 1-based line number within the source document.
    #[serde(
        default,
        alias = "line_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_line: Option<usize>,
}

/// Trade id → entries in source order. Sorted by trade id.
pub type Catalog = BTreeMap<String, Vec<CatalogEntry>>;

/// Summary counts over a loaded catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub trade_count: usize,
    pub total_entry_count: usize,
    pub trade_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Questions and answers
// ---------------------------------------------------------------------------

/// How an answer to a question is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Number,
    SingleChoice,
    MultipleChoice,
    YesNo,
}

impl AnswerKind {
    /// Whether questions of this kind must carry an option list.
    pub fn needs_options(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultipleChoice)
    }
}

/// A single static question asked for a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDefinition {
    /// Unique within its trade (e.g. `fliesen_1`).
    pub id: String,
    pub prompt: String,
    #[serde(rename = "kind")]
    pub answer_kind: AnswerKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

/// Question id → raw answer value as supplied by the caller.
pub type AnswerSet = BTreeMap<String, serde_json::Value>;

/// Outcome of validating an [`AnswerSet`] against a trade's questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Build a result whose `valid` flag reflects the error list.
    pub fn from_messages(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Leistungsverzeichnis
// ---------------------------------------------------------------------------

/// One priced line of an LV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvPosition {
    /// `N.1` numbering.
    pub position_number: String,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Always `quantity * unit_price`.
    pub total_price: Decimal,
    pub catalog_match: bool,
}

/// An assembled bill of quantities for one trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lv {
    pub trade: String,
    /// Localized display title.
    pub trade_title: String,
    pub project_description: String,
    pub positions: Vec<LvPosition>,
    pub total_net: Decimal,
    pub risk_factor: Decimal,
    /// Always `total_net * (1 + risk_factor)`.
    pub total_gross: Decimal,
    pub generated_at: DateTime<Utc>,
    /// Number of positions with `catalog_match`.
    pub catalog_matches: usize,
}

impl Lv {
    /// The risk buffer added on top of the net total.
    pub fn risk_amount(&self) -> Decimal {
        self.total_gross - self.total_net
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for questionnaire session identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What the user described when starting a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub category: String,
    pub description: String,
}

/// Questionnaire progress for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub project: ProjectInfo,
    /// Detected trades, asked in this order.
    pub trades: Vec<String>,
    pub current_trade_index: usize,
    /// Accepted answers keyed by trade id.
    #[serde(default)]
    pub answers: BTreeMap<String, AnswerSet>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Start a session at the first trade.
    pub fn new(project: ProjectInfo, trades: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            project,
            trades,
            current_trade_index: 0,
            answers: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The trade whose questions are pending, if any.
    pub fn current_trade(&self) -> Option<&str> {
        self.trades
            .get(self.current_trade_index)
            .map(String::as_str)
    }

    pub fn is_completed(&self) -> bool {
        self.current_trade_index >= self.trades.len()
    }
}
