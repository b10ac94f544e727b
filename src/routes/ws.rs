//! WebSocket handlers: participant relay, dashboard feed, and bot audio.
//!
//! DESIGN
//! ======
//! Four sockets live under `/ws`:
//!
//! - `meeting/{id}?token=`: authenticated participant. Sends `connected`,
//!   relays typed transcript lines to the room, answers pings.
//! - `meeting/{id}/live`: subscribe-only dashboard feed.
//! - `audio/{id}?key=`: bot PCM stream into the meeting's STT pipeline.
//! - `jitsi-live?key=`: one utterance in, one transcription out.
//!
//! Message handlers are pure: they return an `Outcome` and the connection
//! loop owns every outbound concern (reply to sender, broadcast to peers).
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → join room → send `connected` → broadcast `participant_joined`
//! 2. Text messages → `process_inbound_text` → Outcome applied
//! 3. Room events → forwarded to the socket
//! 4. Close → broadcast `participant_left` → part room

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::{BotKeyQuery, authenticate_token, require_bot_key};
use super::error::ApiError;
use crate::audio::{AudioError, encode_wav, resample_48k_to_16k};
use crate::live::{ClientMessage, LiveEvent, caption_line};
use crate::services::auth::User;
use crate::services::transcript::{self, TranscriptLine, TranscriptSource};
use crate::services::{meeting, room, stt};
use crate::state::AppState;

const NO_SPEECH: &str = "(no speech)";
const JITSI_SAMPLE_RATE: u32 = 16_000;
const BROWSER_SAMPLE_RATE: u32 = 48_000;

// =============================================================================
// OUTCOME
// =============================================================================

/// What the connection loop should do with a handled message.
#[derive(Debug, PartialEq)]
enum Outcome {
    /// Send to the sender only.
    Reply(LiveEvent),
    /// Send to every socket in the room, sender included.
    Broadcast(LiveEvent),
    Nothing,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

// =============================================================================
// PARTICIPANT SOCKET
// =============================================================================

/// `GET /ws/meeting/{id}?token=`
pub async fn meeting_socket(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = match authenticate_token(&state, query.token.as_deref().unwrap_or_default()).await {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = meeting::require_access(&state.pool, meeting_id, auth.user.id).await {
        return ApiError::from(e).into_response();
    }
    ws.on_upgrade(move |socket| run_participant(socket, state, meeting_id, auth.user))
}

async fn run_participant(mut socket: WebSocket, state: AppState, meeting_id: Uuid, user: User) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<LiveEvent>(room::CLIENT_CHANNEL_CAPACITY);

    room::join(&state, meeting_id, client_id, client_tx).await;
    let welcome = LiveEvent::Connected { meeting_id, user_id: user.id };
    if send_event(&mut socket, &welcome).await.is_err() {
        room::part(&state, meeting_id, client_id).await;
        return;
    }
    let joined = LiveEvent::ParticipantJoined { user_id: user.id, timestamp: OffsetDateTime::now_utc() };
    room::broadcast(&state, meeting_id, &joined, Some(client_id)).await;
    info!(%meeting_id, %client_id, user_id = %user.id, "ws: participant connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        match process_inbound_text(&state, meeting_id, &user, &text).await {
                            Outcome::Reply(event) => {
                                if send_event(&mut socket, &event).await.is_err() {
                                    break;
                                }
                            }
                            Outcome::Broadcast(event) => {
                                room::broadcast(&state, meeting_id, &event, None).await;
                            }
                            Outcome::Nothing => {}
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = client_rx.recv() => {
                // `None`: the room dropped this client as unresponsive.
                let Some(event) = event else { break };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    let left = LiveEvent::ParticipantLeft { user_id: user.id, timestamp: OffsetDateTime::now_utc() };
    room::broadcast(&state, meeting_id, &left, Some(client_id)).await;
    room::part(&state, meeting_id, client_id).await;
    info!(%meeting_id, %client_id, "ws: participant disconnected");
}

/// Handle one text message from a participant.
async fn process_inbound_text(state: &AppState, meeting_id: Uuid, user: &User, text: &str) -> Outcome {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(%meeting_id, user_id = %user.id, error = %e, "ws: invalid inbound message");
            return Outcome::Reply(LiveEvent::Error { message: format!("invalid message: {e}") });
        }
    };

    match msg {
        ClientMessage::Ping => Outcome::Reply(LiveEvent::Pong),
        ClientMessage::AudioChunk => Outcome::Nothing,
        ClientMessage::Unknown => {
            debug!(%meeting_id, "ws: ignoring unknown message type");
            Outcome::Nothing
        }
        ClientMessage::Transcript { text } => {
            let text = text.trim();
            if text.is_empty() {
                return Outcome::Nothing;
            }
            let line = TranscriptLine {
                meeting_id,
                user_id: Some(user.id),
                display_name: Some(user.name.clone()),
                text: text.to_owned(),
                source: TranscriptSource::Participant,
                timestamp: OffsetDateTime::now_utc(),
            };
            Outcome::Broadcast(store_and_announce(state, &line).await)
        }
    }
}

/// Persist a speaker-attributed line and build its `transcript_update` event.
async fn store_and_announce(state: &AppState, line: &TranscriptLine) -> LiveEvent {
    if let Err(e) = transcript::record_line(&state.pool, line).await {
        warn!(meeting_id = %line.meeting_id, error = %e, "failed to store transcript line");
    }
    let speaker = line.display_name.as_deref().unwrap_or("Unknown");
    LiveEvent::TranscriptUpdate {
        user_id: line.user_id,
        display_name: line.display_name.clone(),
        text: line.text.clone(),
        line: Some(caption_line(speaker, &line.text)),
        timestamp: line.timestamp,
    }
}

// =============================================================================
// DASHBOARD FEED
// =============================================================================

/// `GET /ws/meeting/{id}/live`: receives every room event, sends nothing.
pub async fn live_socket(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_subscriber(socket, state, meeting_id))
}

async fn run_subscriber(mut socket: WebSocket, state: AppState, meeting_id: Uuid) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<LiveEvent>(room::CLIENT_CHANNEL_CAPACITY);
    room::join(&state, meeting_id, client_id, client_tx).await;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            event = client_rx.recv() => {
                let Some(event) = event else { break };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    room::part(&state, meeting_id, client_id).await;
    debug!(%meeting_id, %client_id, "ws: live subscriber disconnected");
}

// =============================================================================
// BOT AUDIO SINK
// =============================================================================

/// `GET /ws/audio/{id}?key=`: raw PCM16 frames from the meeting bot.
pub async fn audio_socket(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Query(query): Query<BotKeyQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(e) = require_bot_key(&state, query.key.as_deref()) {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| run_audio(socket, state, meeting_id))
}

async fn run_audio(mut socket: WebSocket, state: AppState, meeting_id: Uuid) {
    info!(%meeting_id, "ws: bot audio connected");
    let mut frames = 0_u64;
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Binary(bytes) => {
                frames += 1;
                stt::feed_audio(&state, meeting_id, &bytes).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    info!(%meeting_id, frames, "ws: bot audio disconnected");
}

// =============================================================================
// ONE-SHOT UTTERANCE TRANSCRIPTION
// =============================================================================

/// First message on `/ws/jitsi-live`.
#[derive(Debug, Clone, Deserialize)]
struct UtteranceHeader {
    #[serde(rename = "participantId", alias = "participant_id", default)]
    participant_id: Option<String>,
    #[serde(rename = "displayName", alias = "display_name", default)]
    display_name: Option<String>,
    #[serde(rename = "sampleRate", alias = "sample_rate", default)]
    sample_rate: Option<u32>,
    #[serde(rename = "meeting_id", alias = "meetingId", default)]
    meeting_id: Option<Uuid>,
}

impl UtteranceHeader {
    fn speaker(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or(self.participant_id.as_deref())
            .unwrap_or("Unknown")
            .to_owned()
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
enum UtteranceReply {
    Text {
        #[serde(rename = "displayName")]
        display_name: String,
        text: String,
        line: String,
    },
    Failed {
        error: String,
        #[serde(rename = "displayName")]
        display_name: String,
    },
}

/// Binary frames are raw PCM; text frames carry base64 (optionally a data URL).
fn utterance_audio(msg: Message) -> Option<Vec<u8>> {
    match msg {
        Message::Binary(bytes) => Some(bytes.to_vec()),
        Message::Text(text) => {
            let text = text.as_str().trim();
            let payload = match text.split_once(',') {
                Some((prefix, data)) if prefix.starts_with("data:") => data,
                _ => text,
            };
            BASE64.decode(payload).ok()
        }
        _ => None,
    }
}

/// Bring utterance audio to 16 kHz; 48 kHz browser audio is resampled.
fn to_transcription_rate(pcm: Vec<u8>, sample_rate: Option<u32>) -> Result<(Vec<u8>, u32), AudioError> {
    match sample_rate.unwrap_or(JITSI_SAMPLE_RATE) {
        BROWSER_SAMPLE_RATE => Ok((resample_48k_to_16k(&pcm)?, JITSI_SAMPLE_RATE)),
        rate => Ok((pcm, rate)),
    }
}

/// Utterance audio as a WAV file at its transcription rate.
fn utterance_wav(pcm: Vec<u8>, sample_rate: Option<u32>) -> Result<Vec<u8>, AudioError> {
    let (pcm, rate) = to_transcription_rate(pcm, sample_rate)?;
    encode_wav(&pcm, rate)
}

/// `GET /ws/jitsi-live?key=`
pub async fn jitsi_live_socket(
    State(state): State<AppState>,
    Query(query): Query<BotKeyQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(e) = require_bot_key(&state, query.key.as_deref()) {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| run_utterance(socket, state))
}

async fn run_utterance(mut socket: WebSocket, state: AppState) {
    let header = match socket.recv().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<UtteranceHeader>(&text) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "ws: invalid utterance header");
                let reply = UtteranceReply::Failed { error: format!("invalid header: {e}"), display_name: String::new() };
                let _ = send_json(&mut socket, &reply).await;
                return;
            }
        },
        _ => return,
    };

    let audio = match socket.recv().await {
        Some(Ok(msg)) => utterance_audio(msg),
        _ => None,
    };
    let reply = transcribe_utterance(&state, &header, audio).await;
    let _ = send_json(&mut socket, &reply).await;
    let _ = socket.send(Message::Close(None)).await;
}

async fn transcribe_utterance(state: &AppState, header: &UtteranceHeader, audio: Option<Vec<u8>>) -> UtteranceReply {
    let speaker = header.speaker();
    let Some(pcm) = audio.filter(|a| !a.is_empty()) else {
        return UtteranceReply::Failed { error: "No audio received".into(), display_name: speaker };
    };
    let Some(stt) = state.stt.clone() else {
        return UtteranceReply::Failed { error: "Speech-to-text not configured".into(), display_name: speaker };
    };

    let wav = match utterance_wav(pcm, header.sample_rate) {
        Ok(wav) => wav,
        Err(e) => {
            warn!(speaker = %speaker, error = %e, "utterance audio conversion failed");
            return UtteranceReply::Failed { error: "Transcription failed".into(), display_name: speaker };
        }
    };
    let text = match stt.transcribe(wav, "audio.wav").await {
        Ok(text) => text,
        Err(e) => {
            warn!(speaker = %speaker, error = %e, "utterance transcription failed");
            return UtteranceReply::Failed { error: "Transcription failed".into(), display_name: speaker };
        }
    };
    let text = match text.trim() {
        "" => NO_SPEECH.to_owned(),
        t => t.to_owned(),
    };

    if let Some(meeting_id) = header.meeting_id {
        let line = TranscriptLine {
            meeting_id,
            user_id: None,
            display_name: Some(speaker.clone()),
            text: text.clone(),
            source: TranscriptSource::JitsiBot,
            timestamp: OffsetDateTime::now_utc(),
        };
        let event = store_and_announce(state, &line).await;
        room::broadcast(state, meeting_id, &event, None).await;
    }

    UtteranceReply::Text { line: caption_line(&speaker, &text), display_name: speaker, text }
}

// =============================================================================
// SEND
// =============================================================================

async fn send_event(socket: &mut WebSocket, event: &LiveEvent) -> Result<(), ()> {
    send_json(socket, event).await
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = match serde_json::to_string(value) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize message");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
