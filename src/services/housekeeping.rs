//! Periodic cleanup of expiring in-memory and database state.
//!
//! DESIGN
//! ======
//! One background task wakes every `SESSION_PURGE_INTERVAL_SECS` and:
//!
//! - deletes expired sessions
//! - prunes recent-join entries past the dedupe window (evicting rooms left idle)
//! - drops idle rate-limiter buckets
//!
//! Each step logs its own failure and the loop keeps going.

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{room, session};
use crate::state::AppState;

/// Counts from one sweep, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_purged: u64,
    pub joins_pruned: usize,
}

/// Run one cleanup pass.
pub async fn sweep(state: &AppState) -> SweepReport {
    let sessions_purged = match session::purge_expired(&state.pool).await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "session purge failed");
            0
        }
    };
    let joins_pruned = room::prune_recent_joins(state, OffsetDateTime::now_utc()).await;
    state.rate_limiter.prune_idle();

    let report = SweepReport { sessions_purged, joins_pruned };
    if report == SweepReport::default() {
        debug!("housekeeping sweep: nothing to do");
    } else {
        info!(sessions_purged, joins_pruned, "housekeeping sweep");
    }
    report
}

/// Spawn the periodic housekeeping loop.
#[must_use]
pub fn spawn_housekeeping_task(state: AppState) -> JoinHandle<()> {
    let period = state.config.session_purge_interval;
    info!(interval_secs = period.as_secs(), "housekeeping task configured");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup is not slowed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep(&state).await;
        }
    })
}

#[cfg(test)]
#[path = "housekeeping_test.rs"]
mod tests;
