//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use lvkit_catalog::{CatalogStore, DEFAULT_LIMIT};
use lvkit_core::pipeline::{GenerationReport, ProgressReporter, TradeResult};
use lvkit_core::render::{self, RenderFormat, money};
use lvkit_core::{
    CompletionRequest, LvAssembler, OpenAiProvider, Questionnaire, Step, TextCompletion,
};
use lvkit_questions::Rules;
use lvkit_shared::{
    AnswerKind, AnswerSet, AppConfig, QuestionDefinition, SessionId, ValidationResult,
    init_config, load_config, load_config_from,
};
use lvkit_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lvkit: questionnaire-driven Leistungsverzeichnis estimates.
#[derive(Parser)]
#[command(
    name = "lvkit",
    version,
    about = "Detect trades, ask trade questions and build priced Leistungsverzeichnisse.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.lvkit/lvkit.toml.
    #[arg(long, global = true, env = "LVKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Detect the trades a project description touches.
    Detect {
        /// Free-text project description.
        description: String,
    },

    /// Show the questions asked for a trade.
    Questions {
        /// Trade id (e.g. fliesen).
        trade: String,
    },

    /// Validate answers for a trade.
    Validate {
        /// Trade id.
        trade: String,

        /// JSON file (or inline JSON object) mapping question ids to answers.
        #[arg(long)]
        answers: String,
    },

    /// Price catalog operations.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Assemble and render the LV for one trade.
    Lv {
        /// Trade id.
        trade: String,

        /// Project description printed on the document.
        #[arg(short, long)]
        description: String,

        /// JSON file (or inline JSON object) with answers for the trade.
        #[arg(long)]
        answers: Option<String>,

        /// Output directory (defaults to `[output] dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Document format: text or markdown (defaults to `[output] format`).
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Questionnaire projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Questionnaire sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Text-completion provider.
    Llm {
        #[command(subcommand)]
        action: LlmAction,
    },

    /// Show catalog and provider status.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Catalog subcommands.
#[derive(Subcommand)]
pub(crate) enum CatalogAction {
    /// Show trade and entry counts.
    Stats,
    /// Re-parse the price documents and rewrite the snapshot.
    Rebuild,
    /// Rank a trade's entries against a description.
    Search {
        trade: String,
        description: String,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
}

/// Project subcommands.
#[derive(Subcommand)]
pub(crate) enum ProjectAction {
    /// Start a questionnaire session for a new project.
    New {
        #[arg(long)]
        category: String,
        #[arg(long)]
        description: String,
    },
}

/// Session subcommands.
#[derive(Subcommand)]
pub(crate) enum SessionAction {
    /// Show a session record.
    Show { id: String },
    /// Show the pending trade and its questions.
    Questions { id: String },
    /// Submit answers for the pending trade.
    Answer {
        id: String,
        /// JSON file (or inline JSON object) with the answers.
        #[arg(long)]
        answers: String,
    },
    /// Generate LV documents for every trade of the session.
    Generate {
        id: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(short, long)]
        format: Option<String>,
    },
    /// List live sessions.
    List,
    /// Remove expired sessions.
    Purge,
}

/// LLM subcommands.
#[derive(Subcommand)]
pub(crate) enum LlmAction {
    /// Send a single prompt and print the completion.
    Complete {
        prompt: String,
        /// Optional system prompt.
        #[arg(long)]
        system: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lvkit=info",
        1 => "lvkit=debug",
        _ => "lvkit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let out = Output { json: cli.json };

    match cli.command {
        Command::Detect { description } => cmd_detect(&config, &out, &description),
        Command::Questions { trade } => cmd_questions(&config, &out, &trade),
        Command::Validate { trade, answers } => cmd_validate(&config, &out, &trade, &answers),
        Command::Catalog { action } => match action {
            CatalogAction::Stats => cmd_catalog_stats(&config, &out),
            CatalogAction::Rebuild => cmd_catalog_rebuild(&config, &out),
            CatalogAction::Search {
                trade,
                description,
                limit,
            } => cmd_catalog_search(&config, &out, &trade, &description, limit),
        },
        Command::Lv {
            trade,
            description,
            answers,
            out: dir,
            format,
        } => cmd_lv(
            &config,
            &out,
            &trade,
            &description,
            answers.as_deref(),
            dir,
            format.as_deref(),
        ),
        Command::Project { action } => match action {
            ProjectAction::New {
                category,
                description,
            } => cmd_project_new(&config, &out, &category, &description).await,
        },
        Command::Session { action } => match action {
            SessionAction::Show { id } => cmd_session_show(&config, &out, &id).await,
            SessionAction::Questions { id } => cmd_session_questions(&config, &out, &id).await,
            SessionAction::Answer { id, answers } => {
                cmd_session_answer(&config, &out, &id, &answers).await
            }
            SessionAction::Generate { id, out: dir, format } => {
                cmd_session_generate(&config, &out, &id, dir, format.as_deref()).await
            }
            SessionAction::List => cmd_session_list(&config, &out).await,
            SessionAction::Purge => cmd_session_purge(&config).await,
        },
        Command::Llm { action } => match action {
            LlmAction::Complete { prompt, system } => {
                cmd_llm_complete(&config, &prompt, system.as_deref()).await
            }
        },
        Command::Status => cmd_status(&config, &out),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// Human or JSON output, chosen by `--json`.
struct Output {
    json: bool,
}

impl Output {
    /// Print `value` as JSON, or run `human` to print it for people.
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn load_catalog(config: &AppConfig) -> CatalogStore {
    CatalogStore::load_or_empty(
        Path::new(&config.catalog.snapshot_path),
        Path::new(&config.catalog.source_dir),
    )
}

async fn open_questionnaire(config: &AppConfig) -> Result<Questionnaire<Storage>> {
    let ttl = i64::try_from(config.sessions.ttl_hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .ok_or_else(|| eyre!("sessions.ttl_hours out of range: {}", config.sessions.ttl_hours))?;

    let store = Storage::open(Path::new(&config.sessions.db_path), ttl).await?;
    Ok(Questionnaire::new(store, Rules::load(&config.rules)?, load_catalog(config)))
}

fn parse_session_id(id: &str) -> Result<SessionId> {
    id.parse()
        .map_err(|e| eyre!("invalid session id '{id}': {e}"))
}

fn resolve_format(config: &AppConfig, format: Option<&str>) -> Result<RenderFormat> {
    Ok(format
        .unwrap_or(config.output.format.as_str())
        .parse::<RenderFormat>()?)
}

/// Answers from a JSON file, or from an inline JSON object.
fn read_answers(source: &str) -> Result<AnswerSet> {
    let content = if source.trim_start().starts_with('{') {
        source.to_string()
    } else {
        std::fs::read_to_string(source).map_err(|e| eyre!("cannot read answers file '{source}': {e}"))?
    };
    serde_json::from_str(&content).map_err(|e| eyre!("answers must be a JSON object: {e}"))
}

// ---------------------------------------------------------------------------
// Rules and catalog commands
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DetectedTrade {
    id: String,
    title: String,
}

fn cmd_detect(config: &AppConfig, out: &Output, description: &str) -> Result<()> {
    let rules = Rules::load(&config.rules)?;
    let detected: Vec<DetectedTrade> = rules
        .trades
        .detect_trades(description)
        .into_iter()
        .map(|id| DetectedTrade {
            title: rules.trades.trade_title(&id),
            id,
        })
        .collect();

    out.emit(&detected, |trades| {
        for t in trades {
            println!("  {:<12} {}", t.id, t.title);
        }
    })
}

fn cmd_questions(config: &AppConfig, out: &Output, trade: &str) -> Result<()> {
    let rules = Rules::load(&config.rules)?;
    let questions = rules.questions.get_questions(trade);
    if questions.is_empty() {
        info!(trade, "trade has no questionnaire");
    }

    out.emit(&questions, |questions| print_questions(questions))
}

fn cmd_validate(config: &AppConfig, out: &Output, trade: &str, answers: &str) -> Result<()> {
    let rules = Rules::load(&config.rules)?;
    let answers = read_answers(answers)?;
    let result = rules.questions.validate(trade, &answers);

    out.emit(&result, print_validation)?;
    if result.valid {
        if !out.json {
            println!();
            println!("{}", rules.questions.summarize(trade, &answers));
        }
        Ok(())
    } else {
        Err(eyre!("answers for '{trade}' are invalid"))
    }
}

fn cmd_catalog_stats(config: &AppConfig, out: &Output) -> Result<()> {
    let stats = load_catalog(config).get_stats();
    out.emit(&stats, |stats| {
        println!("  Trades:  {}", stats.trade_count);
        println!("  Entries: {}", stats.total_entry_count);
        if !stats.trade_ids.is_empty() {
            println!("  Ids:     {}", stats.trade_ids.join(", "));
        }
    })
}

fn cmd_catalog_rebuild(config: &AppConfig, out: &Output) -> Result<()> {
    let snapshot = Path::new(&config.catalog.snapshot_path);
    let store = CatalogStore::rebuild(snapshot, Path::new(&config.catalog.source_dir))?;
    let stats = store.get_stats();

    out.emit(&stats, |stats| {
        println!(
            "  Parsed {} entries for {} trades into {}",
            stats.total_entry_count,
            stats.trade_count,
            snapshot.display()
        );
    })
}

fn cmd_catalog_search(
    config: &AppConfig,
    out: &Output,
    trade: &str,
    description: &str,
    limit: usize,
) -> Result<()> {
    let ranked = load_catalog(config).score_and_rank(trade, description, limit);
    out.emit(&ranked, |ranked| {
        if ranked.is_empty() {
            println!("  No matching entries.");
        }
        for r in ranked {
            println!(
                "  [{}] {:>12}  {}",
                r.match_score,
                money(r.entry.price),
                render::truncate(&r.entry.description)
            );
        }
    })
}

fn cmd_lv(
    config: &AppConfig,
    out: &Output,
    trade: &str,
    description: &str,
    answers: Option<&str>,
    dir: Option<PathBuf>,
    format: Option<&str>,
) -> Result<()> {
    let rules = Rules::load(&config.rules)?;
    let catalog = load_catalog(config);
    let format = resolve_format(config, format)?;
    let answers = answers.map(read_answers).transpose()?.unwrap_or_default();

    let lv = LvAssembler::new(&catalog, &rules.trades).assemble(trade, description, &answers);

    let dir = dir.unwrap_or_else(|| PathBuf::from(&config.output.dir));
    let name = render::artifact_file_name(
        &SessionId::new().to_string(),
        trade,
        chrono::Utc::now(),
        format,
    );
    let artifact = render::render(&lv, &dir.join(name), format)?;

    #[derive(Serialize)]
    struct LvOutput<'a> {
        lv: &'a lvkit_shared::Lv,
        artifact: &'a render::Artifact,
    }

    out.emit(&LvOutput { lv: &lv, artifact: &artifact }, |o| {
        println!();
        println!("  {} ({})", o.lv.trade_title, o.lv.trade);
        println!("  Positions: {}", o.lv.positions.len());
        println!("  Net:       {}", money(o.lv.total_net));
        println!("  Gross:     {}", money(o.lv.total_gross));
        println!("  Document:  {}", o.artifact.path.display());
        println!();
    })
}

// ---------------------------------------------------------------------------
// Questionnaire commands
// ---------------------------------------------------------------------------

async fn cmd_project_new(
    config: &AppConfig,
    out: &Output,
    category: &str,
    description: &str,
) -> Result<()> {
    let questionnaire = open_questionnaire(config).await?;
    let session = questionnaire.create_project(category, description).await?;
    let step = questionnaire.current_step(&session.id).await?;

    out.emit(&session, |session| {
        println!();
        println!("  Project created!");
        println!("  Session: {}", session.id);
        println!("  Trades:  {}", session.trades.join(", "));
        println!();
        print_step(&step);
    })
}

async fn cmd_session_show(config: &AppConfig, out: &Output, id: &str) -> Result<()> {
    let questionnaire = open_questionnaire(config).await?;
    let session = questionnaire.session(&parse_session_id(id)?).await?;

    out.emit(&session, |s| {
        println!("  Session:  {}", s.id);
        println!("  Category: {}", s.project.category);
        println!("  Project:  {}", s.project.description);
        println!("  Trades:   {}", s.trades.join(", "));
        println!("  Progress: {}/{}", s.current_trade_index.min(s.trades.len()), s.trades.len());
        println!("  Created:  {}", s.created_at.format("%d.%m.%Y %H:%M"));
        for (trade, answers) in &s.answers {
            println!();
            println!("{}", questionnaire.rules().questions.summarize(trade, answers));
        }
    })
}

async fn cmd_session_questions(config: &AppConfig, out: &Output, id: &str) -> Result<()> {
    let questionnaire = open_questionnaire(config).await?;
    let step = questionnaire.current_step(&parse_session_id(id)?).await?;
    out.emit(&step, print_step)
}

async fn cmd_session_answer(config: &AppConfig, out: &Output, id: &str, answers: &str) -> Result<()> {
    let questionnaire = open_questionnaire(config).await?;
    let answers = read_answers(answers)?;
    let submission = questionnaire
        .submit_answers(&parse_session_id(id)?, answers)
        .await?;

    out.emit(&submission, |s| {
        print_validation(&s.validation);
        if s.accepted {
            println!();
            print_step(&s.next);
        }
    })?;

    if submission.accepted {
        Ok(())
    } else {
        Err(eyre!("answers rejected, session unchanged"))
    }
}

async fn cmd_session_generate(
    config: &AppConfig,
    out: &Output,
    id: &str,
    dir: Option<PathBuf>,
    format: Option<&str>,
) -> Result<()> {
    let questionnaire = open_questionnaire(config).await?;
    let format = resolve_format(config, format)?;
    let dir = dir.unwrap_or_else(|| PathBuf::from(&config.output.dir));

    let reporter = CliProgress::new();
    let report = questionnaire
        .generate(&parse_session_id(id)?, &dir, format, &reporter)
        .await?;

    out.emit(&report, |report| {
        println!();
        println!("  LVs generated for session {}", report.session_id);
        for r in &report.results {
            println!(
                "  {:<12} {:>3} positions  {:>14}  {}",
                r.trade,
                r.positions,
                money(r.total_gross),
                r.artifact.file_name()
            );
        }
        println!("  Total:  {}", money(report.total_gross));
        println!("  Path:   {}", report.output_dir.display());
        println!("  Time:   {:.1}s", report.elapsed.as_secs_f64());
        println!();
    })
}

async fn cmd_session_list(config: &AppConfig, out: &Output) -> Result<()> {
    let questionnaire = open_questionnaire(config).await?;
    let sessions = questionnaire.list().await?;

    out.emit(&sessions, |sessions| {
        if sessions.is_empty() {
            println!("  No sessions.");
        }
        for s in sessions {
            println!(
                "  {}  {:<10} {}/{}  {}",
                s.id,
                if s.completed { "completed" } else { "open" },
                s.current_trade_index.min(s.trades.len()),
                s.trades.len(),
                s.description
            );
        }
    })
}

async fn cmd_session_purge(config: &AppConfig) -> Result<()> {
    let questionnaire = open_questionnaire(config).await?;
    let removed = questionnaire.purge_expired().await?;
    println!("Removed {removed} expired session(s).");
    Ok(())
}

// ---------------------------------------------------------------------------
// Provider, status and config commands
// ---------------------------------------------------------------------------

async fn cmd_llm_complete(config: &AppConfig, prompt: &str, system: Option<&str>) -> Result<()> {
    let provider = OpenAiProvider::from_config(&config.llm)?;
    if !provider.is_available() {
        return Err(eyre!(
            "no API key found, set the {} environment variable",
            config.llm.api_key_env
        ));
    }

    let mut request = CompletionRequest::prompt(prompt);
    if let Some(system) = system {
        request = request.with_system(system);
    }

    let text = provider.complete(request).await?;
    println!("{text}");
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    status: &'static str,
    version: &'static str,
    catalog: lvkit_shared::CatalogStats,
    llm_available: bool,
    llm_model: String,
    issues: Vec<String>,
}

fn cmd_status(config: &AppConfig, out: &Output) -> Result<()> {
    let catalog = load_catalog(config).get_stats();
    let llm_available = config.llm.api_key().is_some();

    let mut issues = Vec::new();
    if catalog.total_entry_count == 0 {
        issues.push("price catalog is empty".to_string());
    }
    if !llm_available {
        issues.push(format!("{} not set", config.llm.api_key_env));
    }

    let report = StatusReport {
        status: if issues.is_empty() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        catalog,
        llm_available,
        llm_model: config.llm.model.clone(),
        issues,
    };

    out.emit(&report, |r| {
        println!("  Status:  {}", r.status);
        println!("  Version: {}", r.version);
        println!(
            "  Catalog: {} trades, {} entries",
            r.catalog.trade_count, r.catalog.total_entry_count
        );
        println!(
            "  LLM:     {} ({})",
            if r.llm_available { "available" } else { "unavailable" },
            r.llm_model
        );
        for issue in &r.issues {
            println!("  ! {issue}");
        }
    })
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Printing helpers
// ---------------------------------------------------------------------------

fn print_questions(questions: &[QuestionDefinition]) {
    for (i, q) in questions.iter().enumerate() {
        let kind = match q.answer_kind {
            AnswerKind::Number => "Zahl",
            AnswerKind::SingleChoice => "Auswahl",
            AnswerKind::MultipleChoice => "Mehrfachauswahl",
            AnswerKind::YesNo => "Ja/Nein",
        };
        let marker = if q.required { "*" } else { " " };
        println!("  {}. {}{} [{}] ({kind})", i + 1, q.prompt, marker, q.id);
        if !q.options.is_empty() {
            println!("       {}", q.options.join(" | "));
        }
    }
}

fn print_step(step: &Step) {
    match step {
        Step::Pending {
            trade_title,
            index,
            total,
            questions,
            ..
        } => {
            println!("  Trade {index}/{total}: {trade_title}");
            print_questions(questions);
        }
        Step::Completed => println!("  All trades answered."),
    }
}

fn print_validation(result: &ValidationResult) {
    println!("  {}", if result.valid { "valid" } else { "invalid" });
    for e in &result.errors {
        println!("  x {e}");
    }
    for w in &result.warnings {
        println!("  ! {w}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn trade_started(&self, trade: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Generating [{current}/{total}] {trade}"));
    }

    fn trade_rendered(&self, result: &TradeResult) {
        if result.artifact.degraded {
            self.spinner
                .println(format!("  ! {} written as error document", result.trade));
        }
    }

    fn done(&self, _report: &GenerationReport) {
        self.spinner.finish_and_clear();
    }
}
