//! Live speech-to-text pipeline.
//!
//! DESIGN
//! ======
//! Bot audio arrives as small PCM frames on the audio websocket. Each frame
//! passes through the room's `AudioChunker` (silence gate) into its
//! `SttBuffer`. When the buffer releases a window, the window is copied out
//! under the room lock, the lock is released, and only then is the
//! transcriber called. Recognized text is stored as both a segment (summary
//! input) and an attributed transcript line, then broadcast to the room.
//!
//! Only `ensure_pipeline` (called when a meeting goes live) creates a
//! pipeline. Late frames after `flush_pipeline` are dropped, so a stopped
//! meeting cannot be revived by a lingering bot connection.
//!
//! Storage failures are logged and do not stop the broadcast; live captions
//! matter more than a missing row.

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::room;
use super::transcript::{self, TranscriptLine, TranscriptSource};
use crate::audio::encode_wav;
use crate::live::LiveEvent;
use crate::state::{AppState, LiveAudio};

const WINDOW_FILE_NAME: &str = "audio.wav";

// =============================================================================
// PIPELINE LIFECYCLE
// =============================================================================

/// Make sure the meeting has a pipeline. Returns `true` when one was created.
pub async fn ensure_pipeline(state: &AppState, meeting_id: Uuid) -> bool {
    if state.stt.is_none() {
        warn!(%meeting_id, "speech-to-text not configured; live audio will be dropped");
    }
    let mut rooms = state.meetings.write().await;
    let room = rooms.entry(meeting_id).or_default();
    if room.audio.is_some() {
        return false;
    }
    room.audio = Some(LiveAudio::new(&state.config.audio));
    info!(%meeting_id, "stt pipeline created");
    true
}

/// Transcribe whatever audio is still buffered, then drop the pipeline.
pub async fn flush_pipeline(state: &AppState, meeting_id: Uuid) -> Option<String> {
    let audio = {
        let mut rooms = state.meetings.write().await;
        let audio = rooms.get_mut(&meeting_id).and_then(|room| room.audio.take());
        if rooms.get(&meeting_id).is_some_and(crate::state::MeetingRoom::is_idle) {
            rooms.remove(&meeting_id);
        }
        audio
    };
    let mut audio = audio?;
    info!(%meeting_id, "stt pipeline closed");

    if let Some(chunk) = audio.chunker.flush() {
        audio.buffer.extend(&chunk);
    }
    let remaining = audio.buffer.drain_all()?;
    transcribe_window(state, meeting_id, remaining, audio.sample_rate).await
}

// =============================================================================
// FEEDING
// =============================================================================

/// Push one PCM frame into the meeting's pipeline. Frames for meetings
/// without a pipeline (never started, or already stopped) are dropped.
/// Returns recognized text when a window was transcribed.
pub async fn feed_audio(state: &AppState, meeting_id: Uuid, frame: &[u8]) -> Option<String> {
    if state.stt.is_none() {
        debug!(%meeting_id, bytes = frame.len(), "no transcriber; audio dropped");
        return None;
    }

    let (window, sample_rate) = {
        let mut rooms = state.meetings.write().await;
        let Some(audio) = rooms.get_mut(&meeting_id).and_then(|room| room.audio.as_mut()) else {
            debug!(%meeting_id, bytes = frame.len(), "no live pipeline; audio dropped");
            return None;
        };
        audio.last_frame_at = OffsetDateTime::now_utc();
        if let Some(chunk) = audio.chunker.push(frame) {
            audio.buffer.extend(&chunk);
        }
        (audio.buffer.take_window()?, audio.sample_rate)
    };

    transcribe_window(state, meeting_id, window, sample_rate).await
}

async fn transcribe_window(state: &AppState, meeting_id: Uuid, pcm: Vec<u8>, sample_rate: u32) -> Option<String> {
    let stt = state.stt.clone()?;
    let wav = match encode_wav(&pcm, sample_rate) {
        Ok(wav) => wav,
        Err(e) => {
            warn!(%meeting_id, error = %e, "window encoding failed");
            return None;
        }
    };
    let text = match stt.transcribe(wav, WINDOW_FILE_NAME).await {
        Ok(text) => text,
        Err(e) => {
            warn!(%meeting_id, error = %e, "transcription failed");
            return None;
        }
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    publish_text(state, meeting_id, text).await;
    Some(text.to_owned())
}

/// Store recognized text and broadcast it to the room.
pub async fn publish_text(state: &AppState, meeting_id: Uuid, text: &str) {
    let now = OffsetDateTime::now_utc();
    if let Err(e) = transcript::record_segment(&state.pool, meeting_id, text, now).await {
        warn!(%meeting_id, error = %e, "failed to store transcript segment");
    }
    let line = TranscriptLine {
        meeting_id,
        user_id: None,
        display_name: None,
        text: text.to_owned(),
        source: TranscriptSource::Stt,
        timestamp: now,
    };
    if let Err(e) = transcript::record_line(&state.pool, &line).await {
        warn!(%meeting_id, error = %e, "failed to store transcript line");
    }
    room::broadcast(state, meeting_id, &LiveEvent::Transcript { text: text.to_owned() }, None).await;
}

#[cfg(test)]
#[path = "stt_test.rs"]
mod tests;
