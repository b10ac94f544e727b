//! Service configuration loaded from environment variables.
//!
//! DESIGN
//! ======
//! `AppConfig::from_env()` runs once at startup after `.env` has been loaded.
//! Only `DATABASE_URL` is mandatory; every other knob falls back to a default
//! when absent or unparsable, so a bad tuning value never blocks startup.

use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;
const DEFAULT_JITSI_DOMAIN: &str = "https://meet.jit.si";
const DEFAULT_BOT_NAME: &str = "Meeting Assistant";
const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 16_000;
const DEFAULT_STT_BUFFER_SECONDS: f64 = 6.0;
const DEFAULT_STT_VAD_RMS_THRESHOLD: f64 = 300.0;
const DEFAULT_MAX_UPLOAD_MB: usize = 25;
const DEFAULT_SESSION_PURGE_INTERVAL_SECS: u64 = 300;

pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub cors_origins: Vec<String>,
    pub access_token_ttl: time::Duration,
    pub jitsi_domain: String,
    pub backend_url: String,
    pub bot: BotConfig,
    pub audio: AudioConfig,
    pub max_upload_bytes: usize,
    pub session_purge_interval: Duration,
}

/// Settings for the external meeting bot runner.
#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    /// Command line of the runner; `None` disables bot launches.
    pub command: Option<Vec<String>>,
    pub name: String,
    pub headless: bool,
    /// When set, bot-facing endpoints require `?key=<secret>`.
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_seconds: f64,
    /// RMS level below which a frame counts as silence. Zero disables the gate.
    pub vad_rms_threshold: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            buffer_seconds: DEFAULT_STT_BUFFER_SECONDS,
            vad_rms_threshold: DEFAULT_STT_VAD_RMS_THRESHOLD,
        }
    }
}

impl AppConfig {
    /// Build the config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env_string("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let port = env_parse("PORT", DEFAULT_PORT);

        let cors_origins = env_string("CORS_ORIGINS").map_or_else(
            || DEFAULT_CORS_ORIGINS.iter().map(|s| (*s).to_owned()).collect(),
            |raw| parse_origins(&raw),
        );

        let bot = BotConfig {
            command: env_string("BOT_COMMAND").map(|raw| split_command(&raw)).filter(|argv| !argv.is_empty()),
            name: env_string("BOT_NAME").unwrap_or_else(|| DEFAULT_BOT_NAME.to_owned()),
            headless: env_bool("BOT_HEADLESS").unwrap_or(true),
            shared_secret: env_string("BOT_SHARED_SECRET"),
        };

        let audio = AudioConfig {
            sample_rate: env_parse("AUDIO_SAMPLE_RATE", DEFAULT_AUDIO_SAMPLE_RATE),
            buffer_seconds: env_parse("STT_BUFFER_SECONDS", DEFAULT_STT_BUFFER_SECONDS).max(0.5),
            vad_rms_threshold: env_parse("STT_VAD_RMS_THRESHOLD", DEFAULT_STT_VAD_RMS_THRESHOLD).max(0.0),
        };

        Ok(Self {
            database_url,
            host: env_string("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            cors_origins,
            access_token_ttl: time::Duration::minutes(env_parse(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES,
            )),
            jitsi_domain: env_string("JITSI_DOMAIN")
                .unwrap_or_else(|| DEFAULT_JITSI_DOMAIN.to_owned())
                .trim_end_matches('/')
                .to_owned(),
            backend_url: env_string("BACKEND_URL").unwrap_or_else(|| format!("http://localhost:{port}")),
            bot,
            audio,
            max_upload_bytes: env_parse("MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB) * 1024 * 1024,
            session_purge_interval: Duration::from_secs(
                env_parse("SESSION_PURGE_INTERVAL_SECS", DEFAULT_SESSION_PURGE_INTERVAL_SECS).max(1),
            ),
        })
    }

    /// Socket address string the listener binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

/// Accepts either a JSON array of strings or a comma-separated list.
pub(crate) fn parse_origins(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return list
                .into_iter()
                .map(|s| s.trim().trim_end_matches('/').to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a command line on whitespace, honouring single and double quotes.
pub(crate) fn split_command(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut has_token = false;

    for c in raw.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                has_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if has_token {
                    out.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        out.push(current);
    }
    out
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
