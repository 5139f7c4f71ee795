//! LV document rendering.
//!
//! Writes an assembled [`Lv`] as a plain-text or Markdown document. A
//! rendering failure still leaves a file at the destination, holding the
//! error description instead of the document.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use lvkit_shared::{Lv, LvPosition, LvkitError, Result};

/// Descriptions longer than this many characters are cut off.
pub const MAX_DESCRIPTION_CHARS: usize = 50;

/// Output document format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    #[default]
    Text,
    Markdown,
}

impl RenderFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }
}

impl FromStr for RenderFormat {
    type Err = LvkitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(LvkitError::config(format!(
                "unknown output format '{other}' (expected text or markdown)"
            ))),
        }
    }
}

impl std::fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
        })
    }
}

/// Metadata of a written LV document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
    /// The file holds an error description instead of the document.
    pub degraded: bool,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `lv_<session>_<trade>_<unix millis>.<ext>`
pub fn artifact_file_name(
    session: &str,
    trade: &str,
    at: DateTime<Utc>,
    format: RenderFormat,
) -> String {
    format!(
        "lv_{session}_{trade}_{}.{}",
        at.timestamp_millis(),
        format.extension()
    )
}

/// Render `lv` to `dest`.
///
/// Only fails when nothing can be written at `dest` at all.
#[instrument(skip_all, fields(trade = %lv.trade, dest = %dest.display(), %format))]
pub fn render(lv: &Lv, dest: &Path, format: RenderFormat) -> Result<Artifact> {
    let (content, degraded) = match build_document(lv, format) {
        Ok(content) => (content, false),
        Err(e) => {
            warn!(error = %e, "document generation failed, writing error document");
            (format!("Fehler bei der Dokument-Generierung: {e}"), true)
        }
    };

    write_atomic(dest, &content)?;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    debug!(size = content.len(), degraded, "wrote LV document");

    Ok(Artifact {
        path: dest.to_path_buf(),
        sha256,
        size_bytes: content.len(),
        degraded,
    })
}

/// The document text for `lv`.
pub fn build_document(lv: &Lv, format: RenderFormat) -> Result<String> {
    let mut out = String::new();
    let written = match format {
        RenderFormat::Text => write_text(&mut out, lv),
        RenderFormat::Markdown => write_markdown(&mut out, lv),
    };
    match written {
        Ok(()) => Ok(out),
        Err(DocError::Lv(e)) => Err(e),
        Err(DocError::Fmt) => Err(LvkitError::Render("formatting failed".into())),
    }
}

/// Summary figures shared by both layouts.
struct Totals {
    net: String,
    risk_label: String,
    risk: String,
    gross: String,
}

impl Totals {
    fn of(lv: &Lv) -> Result<Self> {
        let risk = lv
            .total_gross
            .checked_sub(lv.total_net)
            .ok_or_else(|| LvkitError::Render("risk amount out of range".into()))?;
        let percent = lv
            .risk_factor
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or_else(|| LvkitError::Render("risk factor out of range".into()))?;

        Ok(Self {
            net: money(lv.total_net),
            risk_label: format!("Risiko (+{:.1}%):", round(percent, 1)),
            risk: money(risk),
            gross: money(lv.total_gross),
        })
    }
}

fn write_text(out: &mut String, lv: &Lv) -> std::result::Result<(), DocError> {
    writeln!(out, "Leistungsverzeichnis - {}", lv.trade_title)?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;
    writeln!(out, "Projekt: {}", lv.project_description)?;
    writeln!(out, "Erstellt am: {}", created_at(lv))?;
    writeln!(out)?;
    writeln!(out, "Positionen:")?;
    writeln!(out, "{}", "-".repeat(30))?;

    if lv.positions.is_empty() {
        writeln!(out, "Keine Positionen verfügbar.")?;
    } else {
        for pos in &lv.positions {
            writeln!(out, "{} - {}", pos.position_number, truncate(&pos.description))?;
            writeln!(out, "  Menge: {} {}", pos.quantity.normalize(), pos.unit)?;
            writeln!(out, "  Einzelpreis: {}", money(pos.unit_price))?;
            writeln!(out, "  Gesamtpreis: {}", money(pos.total_price))?;
            writeln!(out)?;
        }

        let totals = Totals::of(lv)?;
        writeln!(out, "{}", "-".repeat(30))?;
        writeln!(out, "Netto: {}", totals.net)?;
        writeln!(out, "{} {}", totals.risk_label, totals.risk)?;
        writeln!(out, "Gesamt: {}", totals.gross)?;
    }

    writeln!(out)?;
    write!(out, "Katalog-Treffer: {}/{}", lv.catalog_matches, lv.positions.len())?;
    Ok(())
}

fn write_markdown(out: &mut String, lv: &Lv) -> std::result::Result<(), DocError> {
    writeln!(out, "# Leistungsverzeichnis - {}", lv.trade_title)?;
    writeln!(out)?;
    writeln!(out, "**Projekt:** {}  ", lv.project_description)?;
    writeln!(out, "**Erstellt am:** {}", created_at(lv))?;
    writeln!(out)?;
    writeln!(out, "## Positionen")?;
    writeln!(out)?;

    if lv.positions.is_empty() {
        writeln!(out, "_Keine Positionen verfügbar._")?;
    } else {
        writeln!(out, "| Pos. | Beschreibung | Einheit | Menge | Einzelpreis | Gesamtpreis |")?;
        writeln!(out, "|------|--------------|---------|------:|------------:|------------:|")?;
        for pos in &lv.positions {
            write_markdown_row(out, pos)?;
        }

        let totals = Totals::of(lv)?;
        writeln!(out)?;
        writeln!(out, "| | |")?;
        writeln!(out, "|---|---:|")?;
        writeln!(out, "| Netto: | {} |", totals.net)?;
        writeln!(out, "| {} | {} |", totals.risk_label, totals.risk)?;
        writeln!(out, "| **Gesamt:** | **{}** |", totals.gross)?;
    }

    writeln!(out)?;
    writeln!(out, "---")?;
    writeln!(out)?;
    write!(out, "Katalog-Treffer: {}/{}", lv.catalog_matches, lv.positions.len())?;
    Ok(())
}

fn write_markdown_row(out: &mut String, pos: &LvPosition) -> std::fmt::Result {
    writeln!(
        out,
        "| {} | {} | {} | {} | {} | {} |",
        pos.position_number,
        truncate(&pos.description).replace('|', "\\|"),
        pos.unit,
        pos.quantity.normalize(),
        money(pos.unit_price),
        money(pos.total_price)
    )
}

/// Document building error: either formatting or out-of-range figures.
#[derive(Debug)]
enum DocError {
    Fmt,
    Lv(LvkitError),
}

impl From<std::fmt::Error> for DocError {
    fn from(_: std::fmt::Error) -> Self {
        Self::Fmt
    }
}

impl From<LvkitError> for DocError {
    fn from(e: LvkitError) -> Self {
        Self::Lv(e)
    }
}

fn created_at(lv: &Lv) -> String {
    lv.generated_at.format("%d.%m.%Y %H:%M").to_string()
}

fn round(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Two decimals and the euro sign.
pub fn money(value: Decimal) -> String {
    format!("{:.2} €", round(value, 2))
}

/// Cut to [`MAX_DESCRIPTION_CHARS`] characters, marking the cut with `...`.
pub fn truncate(description: &str) -> String {
    if description.chars().count() <= MAX_DESCRIPTION_CHARS {
        return description.to_string();
    }
    let head: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
    format!("{head}...")
}

/// Write to a temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LvkitError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LvkitError::Render(format!("invalid document path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| LvkitError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LvkitError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lvkit-render-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn position(n: usize, description: &str, price: Decimal) -> LvPosition {
        LvPosition {
            position_number: format!("{n}.1"),
            description: description.into(),
            unit: "Stk".into(),
            quantity: Decimal::ONE,
            unit_price: price,
            total_price: price,
            catalog_match: true,
        }
    }

    fn lv(positions: Vec<LvPosition>) -> Lv {
        let total_net: Decimal = positions.iter().map(|p| p.total_price).sum();
        Lv {
            trade: "fliesen".into(),
            trade_title: "Fliesenarbeiten".into(),
            project_description: "Badsanierung".into(),
            catalog_matches: positions.len(),
            positions,
            total_net,
            risk_factor: Decimal::new(5, 2),
            total_gross: total_net * Decimal::new(105, 2),
            generated_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 5, 0).unwrap(),
        }
    }

    #[test]
    fn text_document_layout() {
        let doc = build_document(
            &lv(vec![
                position(1, "Wandfliesen verlegen 45,50 €", Decimal::new(4550, 2)),
                position(2, "Silikonfuge 8 €", Decimal::from(8)),
            ]),
            RenderFormat::Text,
        )
        .unwrap();

        assert!(doc.starts_with("Leistungsverzeichnis - Fliesenarbeiten\n"));
        assert!(doc.contains("Projekt: Badsanierung\n"));
        assert!(doc.contains("Erstellt am: 14.03.2026 09:05\n"));
        assert!(doc.contains("1.1 - Wandfliesen verlegen 45,50 €\n"));
        assert!(doc.contains("  Menge: 1 Stk\n"));
        assert!(doc.contains("  Einzelpreis: 45.50 €\n"));
        assert!(doc.contains("  Gesamtpreis: 8.00 €\n"));
        assert!(doc.contains("Netto: 53.50 €\n"));
        assert!(doc.contains("Risiko (+5.0%): 2.68 €\n"));
        assert!(doc.contains("Gesamt: 56.18 €\n"));
        assert!(doc.ends_with("Katalog-Treffer: 2/2"));
    }

    #[test]
    fn empty_lv_has_no_positions_marker() {
        let doc = build_document(&lv(vec![]), RenderFormat::Text).unwrap();
        assert!(doc.contains("Keine Positionen verfügbar."));
        assert!(!doc.contains("Netto:"));
        assert!(doc.ends_with("Katalog-Treffer: 0/0"));

        let md = build_document(&lv(vec![]), RenderFormat::Markdown).unwrap();
        assert!(md.contains("Keine Positionen verfügbar."));
    }

    #[test]
    fn markdown_document_has_table() {
        let doc = build_document(
            &lv(vec![position(1, "Fuge | Silikon", Decimal::from(8))]),
            RenderFormat::Markdown,
        )
        .unwrap();

        assert!(doc.starts_with("# Leistungsverzeichnis - Fliesenarbeiten\n"));
        assert!(doc.contains("| Pos. | Beschreibung |"));
        assert!(doc.contains("| 1.1 | Fuge \\| Silikon | Stk | 1 | 8.00 € | 8.00 € |"));
        assert!(doc.contains("| **Gesamt:** | **8.40 €** |"));
        assert!(doc.contains("Katalog-Treffer: 1/1"));
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let long = "x".repeat(60);
        assert_eq!(truncate(&long), format!("{}...", "x".repeat(50)));
        assert_eq!(truncate("kurz"), "kurz");
        // Character based, not byte based.
        let umlauts = "ä".repeat(51);
        assert_eq!(truncate(&umlauts).chars().count(), 53);
    }

    #[test]
    fn render_writes_file_with_checksum() {
        let tmp = temp_dir();
        let dest = tmp.join("lvs").join("lv_test.txt");

        let artifact = render(&lv(vec![]), &dest, RenderFormat::Text).unwrap();
        assert!(!artifact.degraded);
        assert_eq!(artifact.file_name(), "lv_test.txt");

        let written = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(written.len(), artifact.size_bytes);
        assert_eq!(artifact.sha256.len(), 64);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn failed_document_still_leaves_artifact() {
        let tmp = temp_dir();
        let dest = tmp.join("lv_broken.txt");

        let mut broken = lv(vec![position(1, "a", Decimal::from(1))]);
        broken.total_net = Decimal::MIN;
        broken.total_gross = Decimal::MAX;

        let artifact = render(&broken, &dest, RenderFormat::Text).unwrap();
        assert!(artifact.degraded);
        let written = std::fs::read_to_string(&dest).unwrap();
        assert!(written.starts_with("Fehler bei der Dokument-Generierung:"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_names_are_deterministic() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            artifact_file_name("abc", "maler", at, RenderFormat::Markdown),
            "lv_abc_maler_1700000000123.md"
        );
    }

    #[test]
    fn format_parsing() {
        assert_eq!("text".parse::<RenderFormat>().unwrap(), RenderFormat::Text);
        assert_eq!("MD".parse::<RenderFormat>().unwrap(), RenderFormat::Markdown);
        assert!("pdf".parse::<RenderFormat>().is_err());
    }
}
