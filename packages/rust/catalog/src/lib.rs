//! Price catalog store and keyword matching.
//!
//! The [`CatalogStore`] holds a trade → entries mapping built once at start-up:
//! a persisted JSON snapshot is preferred; without one the raw price
//! documents are parsed and the result is persisted for the next start.
//!
//! **Failure model:** [`CatalogStore::load`] and [`CatalogStore::rebuild`]
//! report errors; [`CatalogStore::load_or_empty`] degrades to an empty
//! catalog so that a missing catalog only ever means "no entries".

pub mod matching;
pub mod parser;

use std::path::Path;

use tracing::{info, instrument, warn};

use lvkit_shared::{Catalog, CatalogEntry, CatalogStats, LvkitError, Result};

pub use matching::{DEFAULT_LIMIT, ScoredEntry};

/// Read-only price catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    catalog: Catalog,
}

impl CatalogStore {
    /// A store with no trades.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an already built catalog.
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Load from `snapshot`, or parse `source_dir` and persist the result.
    #[instrument(skip_all, fields(snapshot = %snapshot.display()))]
    pub fn load(snapshot: &Path, source_dir: &Path) -> Result<Self> {
        if snapshot.exists() {
            let catalog = read_snapshot(snapshot)?;
            info!(trades = catalog.len(), "price catalog loaded from snapshot");
            return Ok(Self { catalog });
        }

        info!(source_dir = %source_dir.display(), "no snapshot, parsing price documents");
        Self::parse_and_persist(snapshot, source_dir)
    }

    /// Like [`CatalogStore::load`], but any failure yields an empty catalog.
    pub fn load_or_empty(snapshot: &Path, source_dir: &Path) -> Self {
        match Self::load(snapshot, source_dir) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "price catalog unavailable, continuing with empty catalog");
                Self::empty()
            }
        }
    }

    /// Re-parse `source_dir` and rewrite `snapshot`, ignoring any existing snapshot.
    #[instrument(skip_all, fields(snapshot = %snapshot.display()))]
    pub fn rebuild(snapshot: &Path, source_dir: &Path) -> Result<Self> {
        Self::parse_and_persist(snapshot, source_dir)
    }

    fn parse_and_persist(snapshot: &Path, source_dir: &Path) -> Result<Self> {
        let catalog = parser::parse_source_dir(source_dir)?;

        if catalog.is_empty() {
            warn!("no price entries found, snapshot not written");
        } else if let Err(e) = write_snapshot(snapshot, &catalog) {
            // The parsed catalog is still usable for this process.
            warn!(error = %e, "failed to persist price catalog snapshot");
        }

        Ok(Self { catalog })
    }

    /// Entries for `trade` in catalog order; empty for unknown trades.
    pub fn get_entries(&self, trade: &str) -> &[CatalogEntry] {
        self.catalog.get(trade).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Trade and entry counts.
    pub fn get_stats(&self) -> CatalogStats {
        CatalogStats {
            trade_count: self.catalog.len(),
            total_entry_count: self.catalog.values().map(Vec::len).sum(),
            trade_ids: self.catalog.keys().cloned().collect(),
        }
    }

    /// Entries of `trade` ranked by keyword score against `description`.
    pub fn score_and_rank(&self, trade: &str, description: &str, limit: usize) -> Vec<ScoredEntry> {
        matching::score_and_rank(self.get_entries(trade), description, limit)
    }

    /// The underlying mapping.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

// ---------------------------------------------------------------------------
// Snapshot persistence
// ---------------------------------------------------------------------------

/// Read a persisted catalog snapshot.
pub fn read_snapshot(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path).map_err(|e| LvkitError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| LvkitError::parse(format!("invalid catalog snapshot {}: {e}", path.display())))
}

/// Write a catalog snapshot atomically (write to temp, then rename).
pub fn write_snapshot(path: &Path, catalog: &Catalog) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LvkitError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(catalog)
        .map_err(|e| LvkitError::parse(format!("catalog serialization failed: {e}")))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LvkitError::config(format!("invalid snapshot path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| LvkitError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LvkitError::io(path, e))?;

    info!(path = %path.display(), trades = catalog.len(), "price catalog snapshot written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
