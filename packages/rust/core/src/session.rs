//! Questionnaire workflow over a [`SessionStore`].
//!
//! A project starts with trade detection on its description. Each trade's
//! questions are then answered in turn; accepted answers advance the session
//! to the next trade. LVs can be generated at any point.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use lvkit_catalog::CatalogStore;
use lvkit_questions::Rules;
use lvkit_shared::{
    AnswerSet, LvkitError, ProjectInfo, QuestionDefinition, Result, Session, SessionId,
    ValidationResult,
};
use lvkit_storage::SessionStore;

use crate::assembler::LvAssembler;
use crate::pipeline::{self, GenerationReport, ProgressReporter};
use crate::render::RenderFormat;

/// Where a session stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Step {
    /// Questions for `trade` are pending.
    Pending {
        trade: String,
        trade_title: String,
        /// 1-based position of `trade` among the session's trades.
        index: usize,
        total: usize,
        questions: Vec<QuestionDefinition>,
    },
    /// Every trade has been answered.
    Completed,
}

/// Outcome of [`Questionnaire::submit_answers`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub validation: ValidationResult,
    /// Whether the answers were stored and the session advanced.
    pub accepted: bool,
    /// The step after this submission.
    pub next: Step,
}

/// One line of [`Questionnaire::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub category: String,
    pub description: String,
    pub trades: Vec<String>,
    pub current_trade_index: usize,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Drives questionnaire sessions for one set of rules and one catalog.
pub struct Questionnaire<S> {
    store: S,
    rules: Rules,
    catalog: CatalogStore,
}

impl<S: SessionStore> Questionnaire<S> {
    pub fn new(store: S, rules: Rules, catalog: CatalogStore) -> Self {
        Self {
            store,
            rules,
            catalog,
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Start a session for a new project.
    #[instrument(skip_all)]
    pub async fn create_project(&self, category: &str, description: &str) -> Result<Session> {
        for (field, value) in [("category", category), ("description", description)] {
            if value.trim().is_empty() {
                return Err(LvkitError::validation(format!("Feld '{field}' ist erforderlich")));
            }
        }

        let trades = self.rules.trades.detect_trades(description);
        let session = Session::new(
            ProjectInfo {
                category: category.trim().to_string(),
                description: description.trim().to_string(),
            },
            trades,
        );
        self.store.put(&session).await?;

        info!(session = %session.id, trades = ?session.trades, "project created");
        Ok(session)
    }

    /// A live session, or `NotFound`.
    pub async fn session(&self, id: &SessionId) -> Result<Session> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| LvkitError::NotFound(format!("Session {id} nicht gefunden")))
    }

    /// The pending trade and its questions.
    pub async fn current_step(&self, id: &SessionId) -> Result<Step> {
        let session = self.session(id).await?;
        Ok(self.step_of(&session))
    }

    /// Validate `answers` for the current trade and, if valid, advance.
    #[instrument(skip_all, fields(session = %id))]
    pub async fn submit_answers(&self, id: &SessionId, answers: AnswerSet) -> Result<Submission> {
        let mut session = self.session(id).await?;

        let Some(trade) = session.current_trade().map(str::to_string) else {
            return Err(LvkitError::validation("Alle Gewerke bereits abgeschlossen"));
        };

        let validation = self.rules.questions.validate(&trade, &answers);
        if !validation.valid {
            warn!(%trade, errors = validation.errors.len(), "answers rejected");
            return Ok(Submission {
                validation,
                accepted: false,
                next: self.step_of(&session),
            });
        }

        session.answers.insert(trade.clone(), answers);
        session.current_trade_index += 1;
        session.updated_at = Utc::now();
        self.store.put(&session).await?;

        info!(%trade, completed = session.is_completed(), "answers accepted");
        Ok(Submission {
            validation,
            accepted: true,
            next: self.step_of(&session),
        })
    }

    /// Generate one LV document per trade of the session.
    pub async fn generate(
        &self,
        id: &SessionId,
        output_dir: &Path,
        format: RenderFormat,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerationReport> {
        let session = self.session(id).await?;
        let assembler = LvAssembler::new(&self.catalog, &self.rules.trades);
        pipeline::generate_lvs(&session, &assembler, output_dir, format, progress)
    }

    /// All live sessions, oldest first.
    pub async fn list(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.store.list().await?;
        Ok(sessions
            .into_iter()
            .map(|s| SessionSummary {
                completed: s.is_completed(),
                id: s.id,
                category: s.project.category,
                description: s.project.description,
                trades: s.trades,
                current_trade_index: s.current_trade_index,
                created_at: s.created_at,
            })
            .collect())
    }

    /// Remove expired sessions from the store.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired().await
    }

    fn step_of(&self, session: &Session) -> Step {
        match session.current_trade() {
            Some(trade) => Step::Pending {
                trade: trade.to_string(),
                trade_title: self.rules.trades.trade_title(trade),
                index: session.current_trade_index + 1,
                total: session.trades.len(),
                questions: self.rules.questions.get_questions(trade).to_vec(),
            },
            None => Step::Completed,
        }
    }
}
