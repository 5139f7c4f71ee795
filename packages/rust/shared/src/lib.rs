//! Shared types, error model, and configuration for lvkit.
//!
//! This crate is the foundation depended on by all other lvkit crates.
//! It provides:
//! - [`LvkitError`]: the unified error type
//! - Domain types ([`CatalogEntry`], [`Lv`], [`QuestionDefinition`], [`Session`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, LlmConfig, OutputConfig, RulesConfig, SessionsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{LvkitError, Result};
pub use types::{
    AnswerKind, AnswerSet, Catalog, CatalogEntry, CatalogStats, Lv, LvPosition, ProjectInfo,
    QuestionDefinition, Session, SessionId, ValidationResult,
};
