use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IeltsError, Result};

const DEFAULT_TARGET_URL: &str = "http://prep.bilkent.edu.tr/ielts/";
const DEFAULT_STATE_FILE: &str = "./bot-state.json";
/// One day.
const MAX_CHECK_INTERVAL_MINUTES: u64 = 24 * 60;

/// Where the monitor keeps its state between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLocation {
    File(PathBuf),
    /// No durable backing. An optional JSON seed (the `BOT_STATE` variable)
    /// is loaded once at startup.
    Ephemeral { seed: Option<String> },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,

    // Monitoring
    pub target_url: String,
    pub check_interval_minutes: u64,
    pub fetch_timeout: Duration,
    pub send_startup_message: bool,

    // Persistence
    pub state: StateLocation,

    // Logging
    pub log_level: String,

    /// Legacy static recipient list. Subscriptions replaced it; kept only to warn.
    pub legacy_chat_ids: Vec<i64>,
}

impl Config {
    /// Load configuration from the process environment (after `.env`).
    /// Fails when a required variable is missing or malformed.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let bot_token = var("BOT_TOKEN").filter(|v| !v.is_empty()).ok_or_else(|| {
            IeltsError::Config("BOT_TOKEN is required. Please set it in your .env file.".into())
        })?;

        let target_url = var("TARGET_URL").unwrap_or_else(|| DEFAULT_TARGET_URL.to_string());
        if target_url.is_empty() {
            return Err(IeltsError::Config("TARGET_URL is required.".into()));
        }
        if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
            return Err(IeltsError::Config(format!(
                "TARGET_URL must be an http(s) URL, got {target_url}"
            )));
        }

        let check_interval_minutes = parse_number(var("CHECK_INTERVAL"), "CHECK_INTERVAL", 1)?;
        if check_interval_minutes == 0 {
            return Err(IeltsError::Config(
                "CHECK_INTERVAL must be at least 1 minute".into(),
            ));
        }
        if check_interval_minutes > MAX_CHECK_INTERVAL_MINUTES {
            return Err(IeltsError::Config(format!(
                "CHECK_INTERVAL must be at most {MAX_CHECK_INTERVAL_MINUTES} minutes, got {check_interval_minutes}"
            )));
        }

        let fetch_timeout_secs = parse_number(var("FETCH_TIMEOUT_SECS"), "FETCH_TIMEOUT_SECS", 10)?;
        if fetch_timeout_secs == 0 {
            return Err(IeltsError::Config(
                "FETCH_TIMEOUT_SECS must be at least 1 second".into(),
            ));
        }

        let send_startup_message = match var("SEND_STARTUP_MESSAGE") {
            None => true,
            Some(v) => parse_bool(&v).ok_or_else(|| {
                IeltsError::Config(format!("SEND_STARTUP_MESSAGE must be true or false, got {v}"))
            })?,
        };

        let state = match var("STATE_FILE") {
            Some(v) if v.is_empty() || v.eq_ignore_ascii_case("none") => StateLocation::Ephemeral {
                seed: var("BOT_STATE").filter(|s| !s.is_empty()),
            },
            Some(v) => StateLocation::File(PathBuf::from(v)),
            None => StateLocation::File(PathBuf::from(DEFAULT_STATE_FILE)),
        };

        let legacy_chat_ids = var("CHAT_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();

        Ok(Self {
            bot_token,
            target_url,
            check_interval_minutes,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            send_startup_message,
            state,
            log_level: var("LOG_LEVEL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "info".to_string()),
            legacy_chat_ids,
        })
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    /// Log the loaded configuration without leaking the bot token.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{}...({} chars)", head, val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  BOT_TOKEN: {}", preview(&self.bot_token));
        tracing::info!("  TARGET_URL: {}", self.target_url);
        tracing::info!("  CHECK_INTERVAL: {} minutes", self.check_interval_minutes);
        tracing::info!("  FETCH_TIMEOUT_SECS: {}", self.fetch_timeout.as_secs());
        tracing::info!("  SEND_STARTUP_MESSAGE: {}", self.send_startup_message);
        match &self.state {
            StateLocation::File(path) => {
                tracing::info!("  STATE_FILE: {}", path.display());
            }
            StateLocation::Ephemeral { seed } => {
                tracing::info!(
                    "  STATE_FILE: <none> (ephemeral, BOT_STATE seed {})",
                    if seed.is_some() { "present" } else { "not set" }
                );
            }
        }
        tracing::info!("  LOG_LEVEL: {}", self.log_level);

        if !self.legacy_chat_ids.is_empty() {
            tracing::warn!(
                count = self.legacy_chat_ids.len(),
                "CHAT_IDS is set but will be ignored; the bot uses /start subscriptions"
            );
        }
    }
}

fn parse_number(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    match value {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| IeltsError::Config(format!("{key} must be a whole number, got {v}"))),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
