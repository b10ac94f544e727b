//! Live room membership and fan-out.
//!
//! DESIGN
//! ======
//! Rooms are created on first use and evicted as soon as `MeetingRoom::is_idle`
//! holds, so the map only contains meetings with live activity. A client whose
//! channel is full or closed is dropped from the room during broadcast; its
//! socket task notices the closed sender and shuts down.

use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::live::LiveEvent;
use crate::state::AppState;

/// Repeated joins of the same participant inside this window are ignored.
pub const JOIN_DEDUPE_WINDOW: Duration = Duration::minutes(5);

/// A pipeline that has received no audio for this long is dropped by pruning.
pub const PIPELINE_IDLE_TIMEOUT: Duration = Duration::minutes(30);

/// Outbound queue depth per socket.
pub const CLIENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// JOIN / PART
// =============================================================================

/// Register a socket in a meeting room, creating the room if needed.
pub async fn join(state: &AppState, meeting_id: Uuid, client_id: Uuid, tx: mpsc::Sender<LiveEvent>) {
    let mut rooms = state.meetings.write().await;
    let room = rooms.entry(meeting_id).or_default();
    room.clients.insert(client_id, tx);
    info!(%meeting_id, %client_id, clients = room.clients.len(), "client joined room");
}

/// Remove a socket and evict the room if nothing else is using it.
pub async fn part(state: &AppState, meeting_id: Uuid, client_id: Uuid) {
    let mut rooms = state.meetings.write().await;
    let Some(room) = rooms.get_mut(&meeting_id) else {
        return;
    };
    room.clients.remove(&client_id);
    let remaining = room.clients.len();
    if room.is_idle() {
        rooms.remove(&meeting_id);
        info!(%meeting_id, "room evicted");
    } else {
        debug!(%meeting_id, %client_id, remaining, "client left room");
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Send an event to every socket in the room, optionally excluding one.
/// Returns the number of clients that received it.
pub async fn broadcast(state: &AppState, meeting_id: Uuid, event: &LiveEvent, exclude: Option<Uuid>) -> usize {
    let mut dead = Vec::new();
    let mut delivered = 0;
    {
        let rooms = state.meetings.read().await;
        let Some(room) = rooms.get(&meeting_id) else {
            return 0;
        };
        for (client_id, tx) in &room.clients {
            if exclude == Some(*client_id) {
                continue;
            }
            if tx.try_send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*client_id);
            }
        }
    }

    if !dead.is_empty() {
        let mut rooms = state.meetings.write().await;
        if let Some(room) = rooms.get_mut(&meeting_id) {
            for client_id in &dead {
                room.clients.remove(client_id);
            }
        }
        debug!(%meeting_id, dropped = dead.len(), kind = event.kind(), "dropped unresponsive clients");
    }
    delivered
}

// =============================================================================
// JOIN DEDUPE
// =============================================================================

fn join_key(participant_id: &str, display_name: &str) -> String {
    format!("{participant_id}|{display_name}")
}

/// Record a participant join. Returns `false` when the same participant joined
/// within [`JOIN_DEDUPE_WINDOW`].
pub async fn note_join(
    state: &AppState,
    meeting_id: Uuid,
    participant_id: &str,
    display_name: &str,
    now: OffsetDateTime,
) -> bool {
    let key = join_key(participant_id, display_name);
    let mut rooms = state.meetings.write().await;
    let room = rooms.entry(meeting_id).or_default();
    if room
        .recent_joins
        .get(&key)
        .is_some_and(|last| now - *last < JOIN_DEDUPE_WINDOW)
    {
        return false;
    }
    room.recent_joins.insert(key, now);
    true
}

/// Release a join recorded by [`note_join`], evicting the room if it became idle.
pub async fn forget_join(state: &AppState, meeting_id: Uuid, participant_id: &str, display_name: &str) {
    let mut rooms = state.meetings.write().await;
    let Some(room) = rooms.get_mut(&meeting_id) else {
        return;
    };
    room.recent_joins.remove(&join_key(participant_id, display_name));
    if room.is_idle() {
        rooms.remove(&meeting_id);
    }
}

/// Drop join entries older than the dedupe window and pipelines idle past
/// [`PIPELINE_IDLE_TIMEOUT`], then evict rooms left idle.
/// Returns the number of join entries removed.
pub async fn prune_recent_joins(state: &AppState, now: OffsetDateTime) -> usize {
    let mut rooms = state.meetings.write().await;
    let mut removed = 0;
    for (meeting_id, room) in rooms.iter_mut() {
        let before = room.recent_joins.len();
        room.recent_joins.retain(|_, joined| now - *joined < JOIN_DEDUPE_WINDOW);
        removed += before - room.recent_joins.len();
        if room.audio.as_ref().is_some_and(|audio| now - audio.last_frame_at >= PIPELINE_IDLE_TIMEOUT) {
            room.audio = None;
            info!(%meeting_id, "stale stt pipeline dropped");
        }
    }
    rooms.retain(|_, room| !room.is_idle());
    removed
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
