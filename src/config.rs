//! Configuration loader and validator for the Firebase→FCM notifier jobs.
//!
//! Every setting has a default, so both jobs can run with no config file at
//! all; a YAML file fills in project-specific values and environment
//! variables override the file. Recognized variables:
//!
//! - `FIREBASE_DATABASE_URL`         → `firebase.database_url`
//! - `FIREBASE_SERVICE_ACCOUNT_KEY_PATH` → `firebase.credentials_path`
//! - `FCM_DEVICE_TOKEN`              → `fcm.device_token`
//! - `FCM_TOPIC`                     → `fcm.topic`
//! - `FCM_DEVICE_TOKENS`             → `fcm.device_tokens` (comma-separated)
//! - `LOOKBACK_MINUTES`              → `payments.lookback_minutes`
//! - `PROCESSED_SESSIONS_FILE`       → `payments.state_file`
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub firebase: Firebase,
    #[serde(default)]
    pub fcm: Fcm,
    #[serde(default)]
    pub cards: Cards,
    #[serde(default)]
    pub payments: Payments,
}

/// Firebase project settings shared by both jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Firebase {
    /// Realtime Database root URL. Required by the cards job only.
    #[serde(default)]
    pub database_url: String,
    /// Local service-account key file, used when neither credential
    /// environment variable is set.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
}

/// Where notifications go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fcm {
    /// Single registration token for the cards job. Takes precedence over
    /// `topic` unless unset, empty, or left at the sample placeholder.
    #[serde(default)]
    pub device_token: Option<String>,
    /// Topic the cards job falls back to.
    #[serde(default = "default_topic")]
    pub topic: Option<String>,
    /// Registration tokens the payments job fans out to.
    #[serde(default)]
    pub device_tokens: Vec<String>,
}

/// Cards job: Realtime Database path layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cards {
    /// Path holding the card records.
    #[serde(default = "default_cards_path")]
    pub path: String,
    /// Path holding the timestamp checkpoint.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,
}

/// Payments job: Firestore collection and local state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payments {
    /// Slash-separated Firestore collection path.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// How far back each run looks for updated sessions.
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: u64,
    /// JSON file remembering which (session, status) pairs were notified.
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_credentials_path() -> String {
    "serviceAccountKey.json".to_string()
}

fn default_topic() -> Option<String> {
    Some("new_cards_topic".to_string())
}

fn default_cards_path() -> String {
    "cards".to_string()
}

fn default_checkpoint_path() -> String {
    "last_notification_check".to_string()
}

fn default_collection() -> String {
    "artifacts/default-app-id/public/data/paymentSessions".to_string()
}

fn default_lookback_minutes() -> u64 {
    5
}

/// Longest accepted lookback window: one year. The window arithmetic casts
/// minutes to `i64` and feeds `chrono::Duration`, both of which need a sane
/// upper bound.
const MAX_LOOKBACK_MINUTES: u64 = 60 * 24 * 365;

fn default_state_file() -> String {
    "processed_sessions.json".to_string()
}

impl Default for Firebase {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl Default for Fcm {
    fn default() -> Self {
        Self {
            device_token: None,
            topic: default_topic(),
            device_tokens: Vec::new(),
        }
    }
}

impl Default for Cards {
    fn default() -> Self {
        Self {
            path: default_cards_path(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

impl Default for Payments {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            lookback_minutes: default_lookback_minutes(),
            state_file: default_state_file(),
        }
    }
}

impl Config {
    /// The Realtime Database URL, or an error when it was never configured.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        let url = self.firebase.database_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid(
                "firebase.database_url must be set (config file or FIREBASE_DATABASE_URL)",
            ));
        }
        Ok(url)
    }
}

/// Load configuration and validate it.
/// - If `path` is Some, that file must exist and parse.
/// - If `path` is None, uses `config.yaml` in the current working directory
///   when present, otherwise starts from the defaults.
/// - Environment variables are applied on top either way.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(p) => parse_file(p)?,
        None => {
            let fallback = Path::new("config.yaml");
            if fallback.exists() {
                parse_file(fallback)?
            } else {
                Config::default()
            }
        }
    };
    apply_env_overrides(&mut cfg, |name| std::env::var(name).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

fn parse_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Apply environment overrides through an injected getter so tests never
/// touch the process environment.
fn apply_env_overrides<F>(cfg: &mut Config, get: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = get("FIREBASE_DATABASE_URL") {
        cfg.firebase.database_url = url;
    }
    if let Some(path) = get("FIREBASE_SERVICE_ACCOUNT_KEY_PATH") {
        cfg.firebase.credentials_path = path;
    }
    if let Some(token) = get("FCM_DEVICE_TOKEN") {
        cfg.fcm.device_token = Some(token);
    }
    if let Some(topic) = get("FCM_TOPIC") {
        cfg.fcm.topic = Some(topic);
    }
    if let Some(tokens) = get("FCM_DEVICE_TOKENS") {
        cfg.fcm.device_tokens = tokens
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(minutes) = get("LOOKBACK_MINUTES") {
        cfg.payments.lookback_minutes = minutes
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("LOOKBACK_MINUTES must be a positive integer"))?;
    }
    if let Some(file) = get("PROCESSED_SESSIONS_FILE") {
        cfg.payments.state_file = file;
    }
    Ok(())
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.firebase.credentials_path.trim().is_empty() {
        return Err(ConfigError::Invalid("firebase.credentials_path must be non-empty"));
    }
    // firebase.database_url may stay empty; only the cards job requires it
    // and checks via Config::database_url at startup.

    if cfg.cards.path.trim().is_empty() {
        return Err(ConfigError::Invalid("cards.path must be non-empty"));
    }
    if cfg.cards.checkpoint_path.trim().is_empty() {
        return Err(ConfigError::Invalid("cards.checkpoint_path must be non-empty"));
    }

    if cfg.payments.collection.trim().is_empty() {
        return Err(ConfigError::Invalid("payments.collection must be non-empty"));
    }
    if cfg.payments.lookback_minutes == 0 {
        return Err(ConfigError::Invalid("payments.lookback_minutes must be > 0"));
    }
    if cfg.payments.lookback_minutes > MAX_LOOKBACK_MINUTES {
        return Err(ConfigError::Invalid(
            "payments.lookback_minutes must be at most 525600 (one year)",
        ));
    }
    if cfg.payments.state_file.trim().is_empty() {
        return Err(ConfigError::Invalid("payments.state_file must be non-empty"));
    }

    Ok(())
}

/// Returns the example YAML content shipped with the repository.
pub fn example() -> &'static str {
    r#"firebase:
  database_url: "https://YOUR_PROJECT-default-rtdb.firebaseio.com/"
  credentials_path: "serviceAccountKey.json"

fcm:
  device_token: "YOUR_DEVICE_FCM_REGISTRATION_TOKEN"
  topic: "new_cards_topic"
  device_tokens:
    - "FIRST_DEVICE_REGISTRATION_TOKEN"
    - "SECOND_DEVICE_REGISTRATION_TOKEN"

cards:
  path: "cards"
  checkpoint_path: "last_notification_check"

payments:
  collection: "artifacts/default-app-id/public/data/paymentSessions"
  lookback_minutes: 5
  state_file: "processed_sessions.json"
"#
}
