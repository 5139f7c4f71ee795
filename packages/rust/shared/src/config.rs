//! Application configuration for lvkit.
//!
//! User config lives at `~/.lvkit/lvkit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LvkitError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lvkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lvkit";

// ---------------------------------------------------------------------------
// Config structs (matching lvkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Price catalog locations.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Where and how LV documents are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// Questionnaire session retention.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Optional replacements for the built-in trade and question tables.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Text-completion provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Persisted trade → entries snapshot (JSON).
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Directory holding the raw `<trade>-lv-prompt.txt` price documents.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            source_dir: default_source_dir(),
        }
    }
}

fn default_snapshot_path() -> String {
    "data/pricing.json".into()
}
fn default_source_dir() -> String {
    "prompts".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for generated LV documents.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Document format: "text" or "markdown".
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: default_format(),
        }
    }
}

fn default_output_dir() -> String {
    "data/lvs".into()
}
fn default_format() -> String {
    "text".into()
}

/// `[sessions]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// libSQL database file holding questionnaire sessions.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Hours a session stays readable after its last write.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_db_path() -> String {
    "data/sessions.db".into()
}
fn default_ttl_hours() -> u64 {
    24
}

/// `[rules]` section. Unset paths use the tables compiled into the binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    /// TOML file with trades, keywords, titles and the default trade list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trades_file: Option<String>,

    /// TOML file with per-trade question definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_file: Option<String>,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for completions.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    /// Parse `base_url`, rejecting anything that is not an absolute http(s) URL.
    pub fn endpoint(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            LvkitError::config(format!("invalid llm.base_url '{}': {e}", self.base_url))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(LvkitError::config(format!(
                "llm.base_url must use http or https, got '{other}'"
            ))),
        }
    }

    /// The API key from the configured env var, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lvkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LvkitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lvkit/lvkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LvkitError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LvkitError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LvkitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LvkitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LvkitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("snapshot_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(!toml_str.contains("trades_file"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.sessions.ttl_hours, 24);
        assert_eq!(parsed.output.format, "text");
        assert_eq!(parsed.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[catalog]
source_dir = "/srv/prices"

[rules]
trades_file = "/etc/lvkit/trades.toml"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.catalog.source_dir, "/srv/prices");
        assert_eq!(config.catalog.snapshot_path, "data/pricing.json");
        assert_eq!(
            config.rules.trades_file.as_deref(),
            Some("/etc/lvkit/trades.toml")
        );
        assert!(config.rules.questions_file.is_none());
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn endpoint_validation() {
        let mut llm = LlmConfig::default();
        assert!(llm.endpoint().is_ok());

        llm.base_url = "ftp://example.com".into();
        assert!(llm.endpoint().is_err());

        llm.base_url = "not a url".into();
        assert!(llm.endpoint().is_err());
    }

    #[test]
    fn missing_api_key_is_none() {
        let mut llm = LlmConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        llm.api_key_env = "LVKIT_TEST_NONEXISTENT_KEY_12345".into();
        assert!(llm.api_key().is_none());
    }
}
