//! Configuration for a sync run
//!
//! The configuration is a JSON document loaded once at startup. Secrets may be
//! supplied through the environment instead of the file. Everything is
//! validated before any stage touches the network, and the resulting
//! [`SyncConfig`] is passed by reference to every stage.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "LISTMONK_SYNC_CONFIG";
/// Configuration file used when neither the CLI nor the environment names one
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Complete configuration of the sync pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Where new users are read from and where the checkpoint lives
    pub source: SourceConfig,
    /// Mapping of source document fields onto import columns
    pub field_mapping: FieldMapping,
    /// Listmonk connection settings
    pub target: TargetConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path of the source database
    #[serde(default)]
    pub db_path: PathBuf,
    /// Collection holding user documents
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Collection holding the sync tracking document
    #[serde(default = "default_tracking_collection")]
    pub tracking_collection: String,
    /// Key of the tracking document that stores the checkpoint
    #[serde(default = "default_last_sync_key")]
    pub last_sync_key: String,
}

fn default_collection() -> String {
    "users".to_string()
}

fn default_tracking_collection() -> String {
    "sync_tracking".to_string()
}

fn default_last_sync_key() -> String {
    "listmonk_last_sync".to_string()
}

/// Import columns a source field can feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetField {
    Email,
    Name,
    CreatedAt,
}

impl TargetField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetField::Email => "email",
            TargetField::Name => "name",
            TargetField::CreatedAt => "created_at",
        }
    }
}

/// Typed `{source_field -> target_field}` table.
///
/// Unknown target names are rejected while deserializing; the source side is
/// checked by [`FieldMapping::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, TargetField>);

impl FieldMapping {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, TargetField)>,
        S: Into<String>,
    {
        Self(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Source field that feeds `target`, if mapped
    pub fn source_field(&self, target: TargetField) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, t)| **t == target)
            .map(|(source, _)| source.as_str())
    }

    /// Source fields to project, ordered email, name, created_at
    pub fn projection(&self) -> Vec<&str> {
        [TargetField::Email, TargetField::Name, TargetField::CreatedAt]
            .iter()
            .filter_map(|t| self.source_field(*t))
            .collect()
    }

    /// Returns every problem found in the table.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for required in [TargetField::Email, TargetField::CreatedAt] {
            if self.source_field(required).is_none() {
                problems.push(format!(
                    "field_mapping: no source field mapped to '{}'",
                    required.as_str()
                ));
            }
        }

        for target in [TargetField::Email, TargetField::Name, TargetField::CreatedAt] {
            let count = self.0.values().filter(|t| **t == target).count();
            if count > 1 {
                problems.push(format!(
                    "field_mapping: '{}' is mapped from {} source fields",
                    target.as_str(),
                    count
                ));
            }
        }

        for source in self.0.keys() {
            if source.trim().is_empty() {
                problems.push("field_mapping: empty source field name".to_string());
            } else if source.contains('.') || source.starts_with('$') {
                problems.push(format!(
                    "field_mapping: '{}' is not a top-level document field",
                    source
                ));
            }
        }

        problems
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::new([
            ("email", TargetField::Email),
            ("name", TargetField::Name),
            ("createdAt", TargetField::CreatedAt),
        ])
    }
}

/// Listmonk connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the Listmonk instance
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// List new subscribers are added to
    #[serde(default)]
    pub list_id: u64,
    /// Timeout for each HTTP call in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Name of the cookie carrying the admin session
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_session_cookie() -> String {
    "session".to_string()
}

impl TargetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Telegram-style notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_notifier_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    /// Forum thread inside the chat, if any
    #[serde(default)]
    pub thread_id: Option<i64>,
}

fn default_notifier_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base_url: default_notifier_api_base_url(),
            bot_token: String::new(),
            chat_id: String::new(),
            thread_id: None,
        }
    }
}

/// Paths of intermediate artifacts and logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw extraction, one row per source record
    #[serde(default = "default_raw_csv")]
    pub raw_csv: PathBuf,
    /// File uploaded to the import endpoint
    #[serde(default = "default_processed_csv")]
    pub processed_csv: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_raw_csv() -> PathBuf {
    PathBuf::from("tmp/raw_users.csv")
}

fn default_processed_csv() -> PathBuf {
    PathBuf::from("tmp/listmonk_import.csv")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_csv: default_raw_csv(),
            processed_csv: default_processed_csv(),
            log_dir: default_log_dir(),
        }
    }
}

/// Log Manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Run logs older than this many days are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_level() -> String {
    "INFO".to_string()
}

fn default_retention_days() -> u32 {
    7
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            retention_days: default_retention_days(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        match self.level.to_uppercase().as_str() {
            "TRACE" => Some(log::LevelFilter::Trace),
            "DEBUG" => Some(log::LevelFilter::Debug),
            "INFO" => Some(log::LevelFilter::Info),
            "WARN" => Some(log::LevelFilter::Warn),
            "ERROR" => Some(log::LevelFilter::Error),
            _ => None,
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl SyncConfig {
    /// Resolve the configuration file path: explicit argument, then
    /// `LISTMONK_SYNC_CONFIG`, then `config.json`.
    pub fn resolve_path(path: Option<&str>) -> PathBuf {
        path.map(PathBuf::from)
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            SyncError::configuration_error(format!(
                "cannot read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::from_json_str(&raw)?;
        config.apply_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Parse without environment overrides or validation.
    pub fn from_json_str(raw: &str) -> SyncResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| SyncError::configuration_error(format!("invalid config file: {}", e)))
    }

    /// Secrets from the environment take precedence over the file.
    pub fn apply_env_vars(&mut self) {
        if let Ok(username) = env::var("LISTMONK_USERNAME") {
            self.target.username = username;
        }
        if let Ok(password) = env::var("LISTMONK_PASSWORD") {
            self.target.password = password;
        }
        if let Ok(token) = env::var("NOTIFY_BOT_TOKEN") {
            self.notifier.bot_token = token;
        }
    }

    /// Check every required option and report all problems at once.
    pub fn validate(&self) -> SyncResult<()> {
        let mut problems = Vec::new();

        if self.source.db_path.as_os_str().is_empty() {
            problems.push("source.db_path is required".to_string());
        }
        if self.source.collection.trim().is_empty() {
            problems.push("source.collection is required".to_string());
        }
        if self.source.tracking_collection.trim().is_empty() {
            problems.push("source.tracking_collection is required".to_string());
        }
        if self.source.last_sync_key.trim().is_empty() {
            problems.push("source.last_sync_key is required".to_string());
        }

        problems.extend(self.field_mapping.validate());

        if self.target.base_url.trim().is_empty() {
            problems.push("target.base_url is required".to_string());
        } else if !self.target.base_url.starts_with("http://")
            && !self.target.base_url.starts_with("https://")
        {
            problems.push("target.base_url must be an http(s) URL".to_string());
        }
        if self.target.username.is_empty() {
            problems.push("target.username is required (or LISTMONK_USERNAME)".to_string());
        }
        if self.target.password.is_empty() {
            problems.push("target.password is required (or LISTMONK_PASSWORD)".to_string());
        }
        if self.target.list_id == 0 {
            problems.push("target.list_id is required".to_string());
        }
        if self.target.timeout_seconds == 0 {
            problems.push("target.timeout_seconds must be greater than 0".to_string());
        }
        if self.target.session_cookie.trim().is_empty() {
            problems.push("target.session_cookie is required".to_string());
        }

        if self.notifier.enabled {
            if self.notifier.bot_token.is_empty() {
                problems
                    .push("notifier.bot_token is required (or NOTIFY_BOT_TOKEN)".to_string());
            }
            if self.notifier.chat_id.trim().is_empty() {
                problems.push("notifier.chat_id is required".to_string());
            }
        }

        if self.paths.raw_csv.as_os_str().is_empty() {
            problems.push("paths.raw_csv is required".to_string());
        }
        if self.paths.processed_csv.as_os_str().is_empty() {
            problems.push("paths.processed_csv is required".to_string());
        }
        if self.paths.log_dir.as_os_str().is_empty() {
            problems.push("paths.log_dir is required".to_string());
        }

        if self.logging.level_filter().is_none() {
            problems.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }
        if self.logging.retention_days == 0 {
            problems.push("logging.retention_days must be greater than 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::configuration_error(problems.join("; ")))
        }
    }

    /// Whether a failure notification can be attempted even though the
    /// configuration as a whole did not validate.
    pub fn notifier_usable(&self) -> bool {
        self.notifier.enabled
            && !self.notifier.bot_token.is_empty()
            && !self.notifier.chat_id.trim().is_empty()
    }
}
