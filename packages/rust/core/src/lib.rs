//! LV assembly, document rendering and the questionnaire workflow for lvkit.
//!
//! This crate ties the catalog, the rule tables and the session store
//! together into end-to-end workflows (e.g. [`Questionnaire::generate`]).

pub mod assembler;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod session;

pub use assembler::{FALLBACK_MARKER, LvAssembler, MAX_POSITIONS, RISK_FACTOR};
pub use llm::{ChatMessage, CompletionRequest, OpenAiProvider, TextCompletion};
pub use pipeline::{GenerationReport, ProgressReporter, SilentProgress, TradeResult};
pub use render::{Artifact, RenderFormat};
pub use session::{Questionnaire, SessionSummary, Step, Submission};
