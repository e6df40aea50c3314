//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$SLOWPOST_CONFIG` (environment variable)
//! 2. `~/.config/slowpost/config.toml` (Linux/macOS)
//!    `%APPDATA%\slowpost\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Relative paths in the `[paths]` section are resolved against the data
//! directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PostError, Result};
use crate::schedule::MAX_OFFSET_SECS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Locations of the store, letters, templates and postal info.
    pub paths: PathsConfig,
    /// Delivery window.
    pub schedule: ScheduleConfig,
    /// Mail transport.
    pub mail: MailConfig,
    /// Subject line generation.
    pub text_generation: TextGenerationConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the data directory (database, logs, relative paths).
    pub data_dir: Option<PathBuf>,
}

/// File locations. Unset templates and prompt fall back to built-ins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite database holding letter records.
    pub database: PathBuf,
    /// Directory where `submit <name>` looks for `<name>.txt`.
    pub letters_dir: PathBuf,
    /// JSON file with `sender` and `recipient` postal data.
    pub postal_info: PathBuf,
    /// HTML template for the letter itself.
    pub letter_template: Option<PathBuf>,
    /// HTML template for the email body.
    pub email_body_template: Option<PathBuf>,
    /// Prompt sent to the text generator for subject lines.
    pub subject_prompt: Option<PathBuf>,
    /// Where transient attachment files are written (system temp dir if unset).
    pub spool_dir: Option<PathBuf>,
}

/// Delivery window, in seconds after the base time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Earliest delivery offset (default: 1 day).
    pub min_offset_secs: i64,
    /// Latest delivery offset (default: 3 days).
    pub max_offset_secs: i64,
}

/// How the mail transport authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailAuth {
    /// Username and (app) password.
    Password,
    /// XOAUTH2 with a cached, refreshable token.
    Oauth2,
}

/// Mail transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SMTP relay hostname.
    pub smtp_host: String,
    /// SMTP port (465 = implicit TLS, anything else = STARTTLS).
    pub smtp_port: u16,
    /// Sender address. Defaults to `username` when empty.
    pub from: String,
    /// SMTP login.
    pub username: String,
    /// Password for `auth = "password"`.
    pub password: Option<String>,
    /// Authentication mode.
    pub auth: MailAuth,
    /// Installed-app OAuth client secret JSON.
    pub client_secret: PathBuf,
    /// Cached OAuth token JSON.
    pub token_cache: PathBuf,
    /// Optional blind copy for every delivery.
    pub bcc: Option<String>,
    /// Connection timeout in seconds.
    pub timeout_secs: u64,
}

/// Subject line generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenerationConfig {
    /// Disable to always use `default_subject`.
    pub enabled: bool,
    /// Base URL of the API.
    pub endpoint: String,
    /// Model name.
    pub model: String,
    /// Inline API key (prefer `api_key_file` or `OPENAI_API_KEY`).
    pub api_key: Option<String>,
    /// JSON file of the form `{"api_key": "..."}`.
    pub api_key_file: Option<PathBuf>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Subject used whenever generation fails.
    pub default_subject: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            data_dir: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("postal.db"),
            letters_dir: PathBuf::from("letters"),
            postal_info: PathBuf::from("postal_info.json"),
            letter_template: None,
            email_body_template: None,
            subject_prompt: None,
            spool_dir: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_offset_secs: 86_400,  // 1 day
            max_offset_secs: 259_200, // 3 days
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            from: String::new(),
            username: String::new(),
            password: None,
            auth: MailAuth::Password,
            client_secret: PathBuf::from("secrets/client_secret.json"),
            token_cache: PathBuf::from("secrets/token.json"),
            bcc: None,
            timeout_secs: 30,
        }
    }
}

impl Default for TextGenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_file: None,
            timeout_secs: 20,
            default_subject: "💌 A letter is waiting for you".to_string(),
        }
    }
}

impl Config {
    /// Check the values a sweep or submission depends on.
    pub fn validate(&self) -> Result<()> {
        if self.schedule.min_offset_secs < 0 {
            return Err(PostError::Config(
                "schedule.min_offset_secs must not be negative".into(),
            ));
        }
        if self.schedule.max_offset_secs < self.schedule.min_offset_secs {
            return Err(PostError::Config(format!(
                "schedule.max_offset_secs ({}) is smaller than min_offset_secs ({})",
                self.schedule.max_offset_secs, self.schedule.min_offset_secs
            )));
        }
        if self.schedule.max_offset_secs > MAX_OFFSET_SECS {
            return Err(PostError::Config(format!(
                "schedule.max_offset_secs ({}) exceeds the limit of {MAX_OFFSET_SECS}",
                self.schedule.max_offset_secs
            )));
        }
        Ok(())
    }

    /// Resolve a configured path against the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir(self).join(path)
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// A missing file yields the defaults. A file that exists but cannot be
/// read or parsed is a configuration error.
pub fn load_config() -> Result<Config> {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Ok(Config::default()),
    }
}

/// Load and validate configuration from a specific file.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| PostError::io(path, e))?;
    let cfg: Config = toml::from_str(&contents)
        .map_err(|e| PostError::Config(format!("{}: {e}", path.display())))?;
    cfg.validate()?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("SLOWPOST_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("slowpost").join("config.toml"))
}

/// Return the data directory for the database, logs and relative paths.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slowpost")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    data_dir(config).join("slowpost.log")
}
