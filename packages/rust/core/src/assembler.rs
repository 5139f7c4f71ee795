//! LV assembler.
//!
//! Turns the catalog entries of one trade into a priced
//! Leistungsverzeichnis: numbered positions, net total, fixed risk markup
//! and gross total.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use lvkit_catalog::CatalogStore;
use lvkit_questions::TradeRegistry;
use lvkit_shared::{AnswerSet, CatalogEntry, Lv, LvPosition, LvkitError, Result};

/// Risk buffer added on top of the net total (5 %).
pub const RISK_FACTOR: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Maximum number of catalog entries taken into one LV.
pub const MAX_POSITIONS: usize = 10;

/// Marker used as project description of a fallback LV.
pub const FALLBACK_MARKER: &str = "Fallback LV";

/// Assembles LVs from a loaded catalog.
#[derive(Debug, Clone, Copy)]
pub struct LvAssembler<'a> {
    catalog: &'a CatalogStore,
    trades: &'a TradeRegistry,
}

impl<'a> LvAssembler<'a> {
    pub fn new(catalog: &'a CatalogStore, trades: &'a TradeRegistry) -> Self {
        Self { catalog, trades }
    }

    /// Assemble the LV for `trade`.
    ///
    /// Takes the first [`MAX_POSITIONS`] catalog entries in catalog order, one
    /// unit each. `answers` do not influence selection or quantities yet.
    /// Never fails: a trade without entries, or any internal error, yields
    /// the fallback LV.
    #[instrument(skip_all, fields(trade = %trade))]
    pub fn assemble(&self, trade: &str, project_description: &str, answers: &AnswerSet) -> Lv {
        debug!(answers = answers.len(), "assembling LV");

        let entries = self.catalog.get_entries(trade);
        if entries.is_empty() {
            warn!("no catalog entries for trade, using fallback LV");
            return self.fallback(trade);
        }

        match self.try_assemble(trade, project_description, entries) {
            Ok(lv) => {
                info!(
                    positions = lv.positions.len(),
                    total_gross = %lv.total_gross,
                    "LV assembled"
                );
                lv
            }
            Err(e) => {
                warn!(error = %e, "LV assembly failed, using fallback LV");
                self.fallback(trade)
            }
        }
    }

    fn try_assemble(
        &self,
        trade: &str,
        project_description: &str,
        entries: &[CatalogEntry],
    ) -> Result<Lv> {
        let mut positions = Vec::with_capacity(entries.len().min(MAX_POSITIONS));
        let mut total_net = Decimal::ZERO;

        for (i, entry) in entries.iter().take(MAX_POSITIONS).enumerate() {
            let quantity = Decimal::ONE;
            let total_price = quantity
                .checked_mul(entry.price)
                .ok_or_else(|| overflow(&entry.description))?;
            total_net = total_net
                .checked_add(total_price)
                .ok_or_else(|| overflow("net total"))?;

            positions.push(LvPosition {
                position_number: format!("{}.1", i + 1),
                description: entry.description.clone(),
                unit: entry.unit.clone(),
                quantity,
                unit_price: entry.price,
                total_price,
                catalog_match: true,
            });
        }

        let total_gross = total_net
            .checked_mul(Decimal::ONE + RISK_FACTOR)
            .ok_or_else(|| overflow("gross total"))?;
        let catalog_matches = positions.iter().filter(|p| p.catalog_match).count();

        Ok(Lv {
            trade: trade.to_string(),
            trade_title: self.trades.trade_title(trade),
            project_description: project_description.to_string(),
            positions,
            total_net,
            risk_factor: RISK_FACTOR,
            total_gross,
            generated_at: Utc::now(),
            catalog_matches,
        })
    }

    /// Empty LV marking that no estimate could be built for `trade`.
    pub fn fallback(&self, trade: &str) -> Lv {
        Lv {
            trade: trade.to_string(),
            trade_title: self.trades.trade_title(trade),
            project_description: FALLBACK_MARKER.to_string(),
            positions: Vec::new(),
            total_net: Decimal::ZERO,
            risk_factor: RISK_FACTOR,
            total_gross: Decimal::ZERO,
            generated_at: Utc::now(),
            catalog_matches: 0,
        }
    }
}

fn overflow(what: &str) -> LvkitError {
    LvkitError::Arithmetic(format!("price sum at {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvkit_shared::Catalog;
    use std::path::Path;

    fn entry(description: &str, price: Decimal) -> CatalogEntry {
        CatalogEntry {
            description: description.into(),
            price,
            unit: "Stk".into(),
            source_line: None,
        }
    }

    fn registry() -> TradeRegistry {
        TradeRegistry::builtin().unwrap()
    }

    fn store(trade: &str, entries: Vec<CatalogEntry>) -> CatalogStore {
        let mut catalog = Catalog::new();
        catalog.insert(trade.into(), entries);
        CatalogStore::from_catalog(catalog)
    }

    #[test]
    fn assembles_positions_and_totals() {
        let catalog = store(
            "fliesen",
            vec![
                entry("Wandfliesen verlegen 45,50 €", Decimal::new(4550, 2)),
                entry("Silikonfuge 8 €", Decimal::new(8, 0)),
            ],
        );
        let trades = registry();
        let lv = LvAssembler::new(&catalog, &trades).assemble("fliesen", "Bad", &AnswerSet::new());

        assert_eq!(lv.trade_title, "Fliesenarbeiten");
        assert_eq!(lv.project_description, "Bad");
        assert_eq!(lv.positions.len(), 2);
        assert_eq!(lv.positions[0].position_number, "1.1");
        assert_eq!(lv.positions[1].position_number, "2.1");
        assert_eq!(lv.positions[0].quantity, Decimal::ONE);
        assert_eq!(lv.positions[0].total_price, Decimal::new(4550, 2));
        assert_eq!(lv.total_net, Decimal::new(5350, 2));
        assert_eq!(lv.total_gross, Decimal::new(561750, 4));
        assert_eq!(lv.risk_amount(), Decimal::new(26750, 4));
        assert_eq!(lv.catalog_matches, 2);
    }

    #[test]
    fn gross_is_net_times_risk() {
        let catalog = CatalogStore::from_catalog(
            lvkit_catalog::parser::parse_source_dir(Path::new("../../../fixtures/prompts")).unwrap(),
        );
        let trades = registry();
        let assembler = LvAssembler::new(&catalog, &trades);

        for trade in ["fliesen", "maler", "sanitaer"] {
            let lv = assembler.assemble(trade, "Sanierung", &AnswerSet::new());
            assert!(!lv.positions.is_empty());
            assert_eq!(lv.total_gross, lv.total_net * Decimal::new(105, 2));
            let sum: Decimal = lv.positions.iter().map(|p| p.total_price).sum();
            assert_eq!(lv.total_net, sum);
            for p in &lv.positions {
                assert_eq!(p.total_price, p.quantity * p.unit_price);
            }
        }
    }

    #[test]
    fn takes_first_ten_entries_in_catalog_order() {
        let entries: Vec<CatalogEntry> = (1..=12)
            .map(|i| entry(&format!("Position {i}"), Decimal::from(i)))
            .collect();
        let catalog = store("maler", entries);
        let trades = registry();
        let lv = LvAssembler::new(&catalog, &trades).assemble("maler", "Wände", &AnswerSet::new());

        assert_eq!(lv.positions.len(), MAX_POSITIONS);
        assert_eq!(lv.positions[0].description, "Position 1");
        assert_eq!(lv.positions[9].description, "Position 10");
        assert_eq!(lv.positions[9].position_number, "10.1");
        assert_eq!(lv.total_net, Decimal::from(55));
    }

    #[test]
    fn unknown_trade_yields_fallback() {
        let catalog = CatalogStore::empty();
        let trades = registry();
        let lv = LvAssembler::new(&catalog, &trades).assemble("dachdecker", "Dach", &AnswerSet::new());

        assert!(lv.positions.is_empty());
        assert_eq!(lv.total_net, Decimal::ZERO);
        assert_eq!(lv.total_gross, Decimal::ZERO);
        assert_eq!(lv.catalog_matches, 0);
        assert_eq!(lv.project_description, FALLBACK_MARKER);
        assert_eq!(lv.trade_title, "Dachdecker");
        assert_eq!(lv.risk_factor, RISK_FACTOR);
    }

    #[test]
    fn overflow_degrades_to_fallback() {
        let catalog = store(
            "sanitaer",
            vec![entry("a", Decimal::MAX), entry("b", Decimal::MAX)],
        );
        let trades = registry();
        let assembler = LvAssembler::new(&catalog, &trades);

        let err = assembler
            .try_assemble("sanitaer", "Bad", catalog.get_entries("sanitaer"))
            .unwrap_err();
        assert!(matches!(err, LvkitError::Arithmetic(_)), "unexpected error kind: {err}");

        let lv = assembler.assemble("sanitaer", "Bad", &AnswerSet::new());
        assert!(lv.positions.is_empty());
        assert_eq!(lv.project_description, FALLBACK_MARKER);
    }

    #[test]
    fn risk_factor_is_five_percent() {
        assert_eq!(RISK_FACTOR, Decimal::new(5, 2));
    }
}
