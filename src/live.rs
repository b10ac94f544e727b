//! Live meeting events: the JSON protocol spoken on meeting websockets.
//!
//! DESIGN
//! ======
//! Every outbound message is a `LiveEvent`, serialized as a flat JSON object
//! tagged by `type` (`{"type":"transcript","text":"..."}`). Dashboards that
//! only understand `{type, text}` can ignore the extra fields carried by
//! richer events. Inbound participant messages use the same tagging scheme.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Server → client event broadcast to a meeting room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Sent once to a participant socket right after upgrade.
    Connected { meeting_id: Uuid, user_id: Uuid },
    ParticipantJoined {
        user_id: Uuid,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    ParticipantLeft {
        user_id: Uuid,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    /// Text produced by the speech-to-text pipeline.
    Transcript { text: String },
    /// A transcript line attributed to a speaker.
    TranscriptUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    Pong,
    Error { message: String },
}

impl LiveEvent {
    /// Wire name of the event, as it appears in the `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::Transcript { .. } => "transcript",
            Self::TranscriptUpdate { .. } => "transcript_update",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

/// Client → server message on a participant socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Transcript { text: String },
    Ping,
    /// Browser-captured audio is not transcribed server-side; accepted and dropped.
    AudioChunk,
    #[serde(other)]
    Unknown,
}

/// Format a transcript line as `Name : text`, the shape shown in live captions.
#[must_use]
pub fn caption_line(display_name: &str, text: &str) -> String {
    format!("{display_name} : {text}")
}
