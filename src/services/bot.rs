//! Meeting bot supervision.
//!
//! ARCHITECTURE
//! ============
//! The bot that joins a conference and streams its audio back is an external
//! program (`BOT_COMMAND`). This module only starts and stops it. Each
//! running bot is owned by a supervisor task; the registry keeps the task's
//! stop channel so `stop` can ask it to kill the child.
//!
//! LIFECYCLE
//! =========
//! 1. `start` checks the registry, launches through the `BotLauncher` seam,
//!    and spawns the supervisor. A second `start` for the same meeting is a no-op.
//! 2. The supervisor waits on either the child exiting or the stop signal.
//! 3. An unexpected exit is logged and the registry entry is removed, so the
//!    next `start` launches a fresh bot.
//! 4. `stop` removes the entry, signals the supervisor, and waits for the
//!    child to be reaped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("invalid meeting url: {0}")]
    InvalidMeetingUrl(String),
    #[error("failed to launch bot: {0}")]
    Launch(String),
    #[error("bot process error: {0}")]
    Process(String),
}

// =============================================================================
// LAUNCH SEAM
// =============================================================================

/// Everything a runner needs to join one meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotLaunch {
    pub meeting_id: Uuid,
    pub meeting_url: String,
    /// Environment handed to the runner.
    pub env: Vec<(String, String)>,
}

/// A launched bot process.
#[async_trait::async_trait]
pub trait BotProcess: Send {
    /// Resolve when the process exits, with its exit code if it has one.
    async fn wait(&mut self) -> Result<Option<i32>, BotError>;
    /// Terminate the process and reap it.
    async fn kill(&mut self) -> Result<(), BotError>;
}

/// Starts bot processes. Swappable so supervision can be tested without spawning.
pub trait BotLauncher: Send + Sync {
    /// Start a runner for `launch`.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Launch`] if the process cannot be started.
    fn launch(&self, launch: &BotLaunch) -> Result<Box<dyn BotProcess>, BotError>;
}

/// Runs `BOT_COMMAND` as a child process.
pub struct ProcessBotLauncher {
    argv: Vec<String>,
}

impl ProcessBotLauncher {
    #[must_use]
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl BotLauncher for ProcessBotLauncher {
    fn launch(&self, launch: &BotLaunch) -> Result<Box<dyn BotProcess>, BotError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(BotError::Launch("empty BOT_COMMAND".into()));
        };
        let child = tokio::process::Command::new(program)
            .args(args)
            .envs(launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BotError::Launch(format!("{program}: {e}")))?;
        Ok(Box::new(ChildBot(child)))
    }
}

struct ChildBot(tokio::process::Child);

#[async_trait::async_trait]
impl BotProcess for ChildBot {
    async fn wait(&mut self) -> Result<Option<i32>, BotError> {
        let status = self
            .0
            .wait()
            .await
            .map_err(|e| BotError::Process(e.to_string()))?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> Result<(), BotError> {
        self.0
            .kill()
            .await
            .map_err(|e| BotError::Process(e.to_string()))
    }
}

// =============================================================================
// LAUNCH ENVIRONMENT
// =============================================================================

/// Static settings shared by every launch.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub bot_name: String,
    pub backend_url: String,
    pub headless: bool,
    pub default_domain: String,
    /// Forwarded so the runner can authenticate its callbacks.
    pub shared_secret: Option<String>,
}

impl BotSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bot_name: config.bot.name.clone(),
            backend_url: config.backend_url.trim_end_matches('/').to_owned(),
            headless: config.bot.headless,
            default_domain: config.jitsi_domain.clone(),
            shared_secret: config.bot.shared_secret.clone(),
        }
    }
}

/// Split a conference URL into `(domain, room)`.
///
/// `https://meet.jit.si/DailyStandup?x=1` → `("meet.jit.si", "DailyStandup")`.
/// A bare room name (no scheme) is paired with `default_domain`.
///
/// # Errors
///
/// Returns [`BotError::InvalidMeetingUrl`] when no room can be found.
pub fn parse_meeting_url(meeting_url: &str, default_domain: &str) -> Result<(String, String), BotError> {
    let trimmed = meeting_url.trim();
    if !trimmed.contains("://") {
        let room = trimmed.trim_matches('/');
        if room.is_empty() || room.contains('/') {
            return Err(BotError::InvalidMeetingUrl(meeting_url.to_owned()));
        }
        let domain = reqwest::Url::parse(default_domain)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_else(|| default_domain.to_owned());
        return Ok((domain, room.to_owned()));
    }

    let url = reqwest::Url::parse(trimmed).map_err(|_| BotError::InvalidMeetingUrl(meeting_url.to_owned()))?;
    let host = url
        .host_str()
        .ok_or_else(|| BotError::InvalidMeetingUrl(meeting_url.to_owned()))?;
    let domain = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let room = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .ok_or_else(|| BotError::InvalidMeetingUrl(meeting_url.to_owned()))?;
    Ok((domain, room.to_owned()))
}

/// Build the runner environment for one meeting.
///
/// # Errors
///
/// Returns [`BotError::InvalidMeetingUrl`] when the URL has no room.
pub fn build_launch(settings: &BotSettings, meeting_id: Uuid, meeting_url: &str) -> Result<BotLaunch, BotError> {
    let (domain, room) = parse_meeting_url(meeting_url, &settings.default_domain)?;
    let ws_base = settings
        .backend_url
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    let mut env = vec![
        ("JITSI_DOMAIN".to_owned(), domain),
        ("ROOM_NAME".to_owned(), room),
        ("BOT_NAME".to_owned(), settings.bot_name.clone()),
        ("BACKEND_URL".to_owned(), settings.backend_url.clone()),
        ("MEETING_ID".to_owned(), meeting_id.to_string()),
        ("HEADLESS".to_owned(), if settings.headless { "1" } else { "0" }.to_owned()),
        ("AUDIO_WS_URL".to_owned(), format!("{ws_base}/api/v1/ws/audio/{meeting_id}")),
    ];
    if let Some(secret) = &settings.shared_secret {
        env.push(("BOT_SHARED_SECRET".to_owned(), secret.clone()));
    }
    Ok(BotLaunch { meeting_id, meeting_url: meeting_url.to_owned(), env })
}

// =============================================================================
// MANAGER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStart {
    Started,
    AlreadyRunning,
    /// No launcher configured.
    Disabled,
}

struct ActiveBot {
    run_id: Uuid,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<Uuid, ActiveBot>>>;

/// Registry of running bots, one per meeting.
#[derive(Clone)]
pub struct BotManager {
    registry: Registry,
    launcher: Option<Arc<dyn BotLauncher>>,
    settings: Arc<BotSettings>,
}

impl BotManager {
    #[must_use]
    pub fn new(launcher: Option<Arc<dyn BotLauncher>>, settings: BotSettings) -> Self {
        Self { registry: Arc::new(Mutex::new(HashMap::new())), launcher, settings: Arc::new(settings) }
    }

    /// Manager wired to `BOT_COMMAND`, or disabled when it is unset.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let launcher = config
            .bot
            .command
            .clone()
            .map(|argv| Arc::new(ProcessBotLauncher::new(argv)) as Arc<dyn BotLauncher>);
        Self::new(launcher, BotSettings::from_config(config))
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.launcher.is_some()
    }

    #[must_use]
    pub fn bot_name(&self) -> &str {
        &self.settings.bot_name
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_running(&self, meeting_id: Uuid) -> bool {
        lock(&self.registry).contains_key(&meeting_id)
    }

    #[cfg(test)]
    #[must_use]
    pub fn running_count(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Launch a bot for the meeting unless one is already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is unusable or the process fails to start.
    pub fn start(&self, meeting_id: Uuid, meeting_url: &str) -> Result<BotStart, BotError> {
        let Some(launcher) = &self.launcher else {
            return Ok(BotStart::Disabled);
        };
        let launch = build_launch(&self.settings, meeting_id, meeting_url)?;

        let mut registry = lock(&self.registry);
        if registry.contains_key(&meeting_id) {
            return Ok(BotStart::AlreadyRunning);
        }
        let process = launcher.launch(&launch)?;
        let run_id = Uuid::new_v4();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(self.registry.clone(), meeting_id, run_id, process, stop_rx));
        registry.insert(meeting_id, ActiveBot { run_id, stop_tx, task });
        drop(registry);

        info!(%meeting_id, %run_id, "bot launched");
        Ok(BotStart::Started)
    }

    /// Stop the meeting's bot. Returns `false` when none was running.
    pub async fn stop(&self, meeting_id: Uuid) -> bool {
        let Some(active) = lock(&self.registry).remove(&meeting_id) else {
            return false;
        };
        let _ = active.stop_tx.send(());
        if tokio::time::timeout(STOP_TIMEOUT, active.task).await.is_err() {
            warn!(%meeting_id, "bot supervisor did not finish in time");
        }
        info!(%meeting_id, "bot stopped");
        true
    }

    /// Stop every running bot. Used at process shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = lock(&self.registry).keys().copied().collect();
        for meeting_id in ids {
            self.stop(meeting_id).await;
        }
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, HashMap<Uuid, ActiveBot>> {
    registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn supervise(
    registry: Registry,
    meeting_id: Uuid,
    run_id: Uuid,
    mut process: Box<dyn BotProcess>,
    stop_rx: oneshot::Receiver<()>,
) {
    let exited = tokio::select! {
        status = process.wait() => Some(status),
        _ = stop_rx => None,
    };

    match exited {
        Some(status) => {
            match status {
                Ok(code) => warn!(%meeting_id, ?code, "bot exited"),
                Err(e) => warn!(%meeting_id, error = %e, "bot wait failed"),
            }
            let mut guard = lock(&registry);
            if guard.get(&meeting_id).is_some_and(|a| a.run_id == run_id) {
                guard.remove(&meeting_id);
            }
        }
        None => {
            if let Err(e) = process.kill().await {
                warn!(%meeting_id, error = %e, "bot kill failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "bot_test.rs"]
mod tests;
