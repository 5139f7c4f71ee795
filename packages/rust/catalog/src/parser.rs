//! Price source document parser.
//!
//! Source documents are free text. Any non-empty line carrying a currency
//! amount becomes one catalog entry:
//! - `45,50 €` / `45.50 €`
//! - `€ 45,50`
//! - `45,50 EUR`
//!
//! Comma decimal separators are normalized to dots. Lines without an amount
//! are skipped.

use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use lvkit_shared::{Catalog, CatalogEntry, LvkitError, Result};

/// File name suffix marking a price source document (`<trade>-lv-prompt.txt`).
pub const SOURCE_SUFFIX: &str = "-lv-prompt.txt";

/// Unit assigned to parsed entries; the source format has no unit column.
pub const DEFAULT_UNIT: &str = "Stk";

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `123,45 €`.
static AMOUNT_EURO_SIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:,\d+)?(?:\.\d+)?)\s*€").expect("amount-euro regex")
});

/// Matches `€ 123,45`.
static EURO_SIGN_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"€\s*(\d+(?:,\d+)?(?:\.\d+)?)").expect("euro-amount regex")
});

/// Matches `123,45 EUR`.
static AMOUNT_EUR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:,\d+)?(?:\.\d+)?)\s*EUR").expect("amount-EUR regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse one price document into entries, in line order.
pub fn parse_price_document(content: &str) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(price) = extract_price(line) {
            entries.push(CatalogEntry {
                description: line.to_string(),
                price,
                unit: DEFAULT_UNIT.to_string(),
                source_line: Some(idx + 1),
            });
        }
    }

    entries
}

/// First parseable amount of the first pattern class that yields one.
pub fn extract_price(line: &str) -> Option<Decimal> {
    let patterns: [&Regex; 3] = [&AMOUNT_EURO_SIGN_RE, &EURO_SIGN_AMOUNT_RE, &AMOUNT_EUR_RE];

    for re in patterns {
        for caps in re.captures_iter(line) {
            match parse_amount(&caps[1]) {
                Some(price) => return Some(price),
                None => debug!(amount = &caps[1], line, "unparseable amount, trying next"),
            }
        }
    }

    None
}

/// `45,50` → `45.50`. Amounts with two separators (`1,234.5`) do not parse.
fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', ".")).ok()
}

/// Extract the trade id from a source file name (`fliesen-lv-prompt.txt` → `fliesen`).
pub fn trade_id_from_filename(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(SOURCE_SUFFIX)
        .filter(|trade| !trade.is_empty())
}

/// Parse every source document in `dir` into a catalog.
///
/// Documents are visited in file-name order. Unreadable documents and
/// documents without any price are skipped with a warning; only a missing
/// or unreadable directory fails the whole build.
pub fn parse_source_dir(dir: &Path) -> Result<Catalog> {
    if !dir.is_dir() {
        return Err(LvkitError::config(format!(
            "price source directory not found: {}",
            dir.display()
        )));
    }

    let mut files: Vec<(String, std::path::PathBuf)> = std::fs::read_dir(dir)
        .map_err(|e| LvkitError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.path()))
        })
        .collect();
    files.sort();

    let mut catalog = Catalog::new();

    for (name, path) in files {
        let Some(trade) = trade_id_from_filename(&name) else {
            debug!(file = %name, "not a price source document, skipping");
            continue;
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read price document, skipping");
                continue;
            }
        };

        let entries = parse_price_document(&content);
        if entries.is_empty() {
            warn!(path = %path.display(), "no prices found in document");
            continue;
        }

        info!(trade, entries = entries.len(), "parsed price document");
        catalog.insert(trade.to_string(), entries);
    }

    Ok(catalog)
}
