//! End-to-end `generate` pipeline: session → assemble per trade → render → report.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use lvkit_shared::{AnswerSet, LvkitError, Result, Session, SessionId};

use crate::assembler::LvAssembler;
use crate::render::{self, Artifact, RenderFormat};

/// Outcome for one trade of a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct TradeResult {
    pub trade: String,
    pub trade_title: String,
    /// Number of LV positions.
    pub positions: usize,
    pub total_net: Decimal,
    pub total_gross: Decimal,
    pub catalog_matches: usize,
    pub artifact: Artifact,
}

/// Result of the `generate` pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub session_id: SessionId,
    /// One entry per session trade, in trade order.
    pub results: Vec<TradeResult>,
    /// Sum of all gross totals.
    pub total_gross: Decimal,
    /// Directory the documents were written to.
    pub output_dir: PathBuf,
    #[serde(skip)]
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting generation status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a trade's LV is assembled.
    fn trade_started(&self, trade: &str, current: usize, total: usize);
    /// Called after a trade's document has been written.
    fn trade_rendered(&self, result: &TradeResult);
    /// Called when the pipeline completes.
    fn done(&self, report: &GenerationReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn trade_started(&self, _trade: &str, _current: usize, _total: usize) {}
    fn trade_rendered(&self, _result: &TradeResult) {}
    fn done(&self, _report: &GenerationReport) {}
}

/// Assemble and render one LV per trade of `session`.
///
/// Trades without stored answers are assembled with an empty answer set.
/// Documents are named by session id, trade and generation time.
#[instrument(skip_all, fields(session = %session.id, trades = session.trades.len()))]
pub fn generate_lvs(
    session: &Session,
    assembler: &LvAssembler<'_>,
    output_dir: &Path,
    format: RenderFormat,
    progress: &dyn ProgressReporter,
) -> Result<GenerationReport> {
    let start = Instant::now();
    let empty = AnswerSet::new();
    let session_label = session.id.to_string();

    info!(output_dir = %output_dir.display(), %format, "starting generate pipeline");

    let mut results = Vec::with_capacity(session.trades.len());
    let mut total_gross = Decimal::ZERO;

    for (i, trade) in session.trades.iter().enumerate() {
        progress.trade_started(trade, i + 1, session.trades.len());

        let answers = session.answers.get(trade).unwrap_or(&empty);
        let lv = assembler.assemble(trade, &session.project.description, answers);

        let file_name = render::artifact_file_name(&session_label, trade, Utc::now(), format);
        let artifact = render::render(&lv, &output_dir.join(file_name), format)?;

        total_gross = total_gross
            .checked_add(lv.total_gross)
            .ok_or_else(|| LvkitError::Arithmetic("gross total across trades".into()))?;

        let result = TradeResult {
            trade: trade.clone(),
            trade_title: lv.trade_title,
            positions: lv.positions.len(),
            total_net: lv.total_net,
            total_gross: lv.total_gross,
            catalog_matches: lv.catalog_matches,
            artifact,
        };
        progress.trade_rendered(&result);
        results.push(result);
    }

    let report = GenerationReport {
        session_id: session.id.clone(),
        results,
        total_gross,
        output_dir: output_dir.to_path_buf(),
        elapsed: start.elapsed(),
    };

    info!(
        documents = report.results.len(),
        total_gross = %report.total_gross,
        elapsed_ms = report.elapsed.as_millis(),
        "generate pipeline complete"
    );
    progress.done(&report);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use lvkit_catalog::CatalogStore;
    use lvkit_questions::TradeRegistry;
    use lvkit_shared::ProjectInfo;

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn trade_started(&self, trade: &str, current: usize, total: usize) {
            self.events.lock().unwrap().push(format!("start {trade} {current}/{total}"));
        }
        fn trade_rendered(&self, result: &TradeResult) {
            self.events.lock().unwrap().push(format!("rendered {}", result.trade));
        }
        fn done(&self, report: &GenerationReport) {
            self.events.lock().unwrap().push(format!("done {}", report.results.len()));
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lvkit-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn generates_one_document_per_trade() {
        let tmp = temp_dir();
        let catalog = CatalogStore::from_catalog(
            lvkit_catalog::parser::parse_source_dir(Path::new("../../../fixtures/prompts")).unwrap(),
        );
        let trades = TradeRegistry::builtin().unwrap();
        let assembler = LvAssembler::new(&catalog, &trades);

        let session = Session::new(
            ProjectInfo {
                category: "Renovierung".into(),
                description: "Bad mit Fliesen".into(),
            },
            vec!["sanitaer".into(), "fliesen".into(), "elektro".into()],
        );

        let progress = RecordingProgress::default();
        let report =
            generate_lvs(&session, &assembler, &tmp, RenderFormat::Text, &progress).unwrap();

        assert_eq!(report.results.len(), 3);
        let order: Vec<&str> = report.results.iter().map(|r| r.trade.as_str()).collect();
        assert_eq!(order, vec!["sanitaer", "fliesen", "elektro"]);

        // elektro has no catalog entries and falls back to an empty LV.
        assert_eq!(report.results[2].positions, 0);
        assert_eq!(report.results[2].total_gross, Decimal::ZERO);

        let sum: Decimal = report.results.iter().map(|r| r.total_gross).sum();
        assert_eq!(report.total_gross, sum);

        for result in &report.results {
            assert!(result.artifact.path.exists());
            let name = result.artifact.file_name();
            assert!(name.starts_with(&format!("lv_{}_{}_", session.id, result.trade)));
            assert!(name.ends_with(".txt"));
        }

        let events = progress.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("start sanitaer 1/3"));
        assert_eq!(events.last().map(String::as_str), Some("done 3"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn gross_sum_overflow_is_an_arithmetic_error() {
        let tmp = temp_dir();
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);
        let mut catalog = lvkit_shared::Catalog::new();
        for trade in ["sanitaer", "fliesen"] {
            catalog.insert(
                trade.into(),
                vec![lvkit_shared::CatalogEntry {
                    description: "Großauftrag".into(),
                    price: huge,
                    unit: "Stk".into(),
                    source_line: None,
                }],
            );
        }
        let catalog = CatalogStore::from_catalog(catalog);
        let trades = TradeRegistry::builtin().unwrap();
        let assembler = LvAssembler::new(&catalog, &trades);

        let session = Session::new(
            ProjectInfo {
                category: "Neubau".into(),
                description: "Bad mit Fliesen".into(),
            },
            vec!["sanitaer".into(), "fliesen".into()],
        );

        let err = generate_lvs(&session, &assembler, &tmp, RenderFormat::Text, &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, LvkitError::Arithmetic(_)), "unexpected error kind: {err}");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
