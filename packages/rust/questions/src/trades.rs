//! Keyword-based trade detection and trade display titles.
//!
//! Matching is plain substring search on the lower-cased description, so a
//! keyword may hit inside an unrelated word ("bad" in "Badezimmer", but also
//! in "Sonnenbad"). No tokenization is applied.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use lvkit_shared::{LvkitError, Result};

/// Built-in trade table.
const BUILTIN_TRADES: &str = include_str!("../data/trades.toml");

/// One trade with its display title and detection keywords.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeRule {
    pub id: String,
    pub title: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TradeTable {
    defaults: Vec<String>,
    #[serde(default, rename = "trade")]
    trades: Vec<TradeRule>,
}

/// Known trades in detection order plus the fallback trade list.
#[derive(Debug, Clone)]
pub struct TradeRegistry {
    trades: Vec<TradeRule>,
    defaults: Vec<String>,
}

impl TradeRegistry {
    /// The trade table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_TRADES)
    }

    /// Load a trade table from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LvkitError::io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| LvkitError::parse(format!("{}: {e}", path.display())))
    }

    /// Parse and check a trade table.
    ///
    /// Keywords are lower-cased on load. Trade ids must be unique, the
    /// default list must be non-empty and reference known trades only.
    pub fn from_toml(content: &str) -> Result<Self> {
        let table: TradeTable = toml::from_str(content)
            .map_err(|e| LvkitError::parse(format!("invalid trade table: {e}")))?;

        let mut seen = HashSet::new();
        for trade in &table.trades {
            if !seen.insert(trade.id.as_str()) {
                return Err(LvkitError::parse(format!("duplicate trade id '{}'", trade.id)));
            }
        }

        if table.defaults.is_empty() {
            return Err(LvkitError::parse("default trade list must not be empty"));
        }
        if let Some(unknown) = table.defaults.iter().find(|d| !seen.contains(d.as_str())) {
            return Err(LvkitError::parse(format!("unknown default trade '{unknown}'")));
        }

        let trades = table
            .trades
            .into_iter()
            .map(|trade| TradeRule {
                keywords: trade
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
                ..trade
            })
            .collect();

        Ok(Self {
            trades,
            defaults: table.defaults,
        })
    }

    /// Trades whose keywords occur in `description`, in table order.
    ///
    /// Never empty: without any hit the default trade list is returned.
    pub fn detect_trades(&self, description: &str) -> Vec<String> {
        let haystack = description.to_lowercase();

        let detected: Vec<String> = self
            .trades
            .iter()
            .filter(|trade| trade.keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|trade| trade.id.clone())
            .collect();

        if detected.is_empty() {
            debug!("no trade keyword matched, using default trades");
            return self.defaults.clone();
        }

        debug!(trades = ?detected, "trades detected");
        detected
    }

    /// Localized title; unknown ids fall back to the capitalized id.
    pub fn trade_title(&self, trade: &str) -> String {
        self.trades
            .iter()
            .find(|t| t.id == trade)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| capitalize(trade))
    }

    pub fn trades(&self) -> &[TradeRule] {
        &self.trades
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
