use std::sync::Arc;

use super::*;
use crate::config::AudioConfig;
use crate::llm::Transcriber;
use crate::llm::mock::MockTranscriber;
use crate::state::test_helpers::{attach_client, test_app_state, test_app_state_full, test_config};

const FRAME_BYTES: usize = 640;

fn loud_frame() -> Vec<u8> {
    std::iter::repeat_n(2000_i16.to_le_bytes(), FRAME_BYTES / 2)
        .flatten()
        .collect()
}

fn silent_frame() -> Vec<u8> {
    vec![0; FRAME_BYTES]
}

/// 0.1 s windows: one chunk of ten 20 ms frames fills two windows.
fn state_with(stt: Arc<MockTranscriber>) -> AppState {
    let mut config = test_config();
    config.audio = AudioConfig { sample_rate: 16_000, buffer_seconds: 0.1, vad_rms_threshold: 300.0 };
    test_app_state_full(config, None, Some(stt as Arc<dyn Transcriber>))
}

#[tokio::test]
async fn ensure_pipeline_is_idempotent() {
    let state = test_app_state();
    let meeting_id = Uuid::new_v4();
    assert!(ensure_pipeline(&state, meeting_id).await);
    assert!(!ensure_pipeline(&state, meeting_id).await);
    assert!(state.meetings.read().await[&meeting_id].audio.is_some());
}

#[tokio::test]
async fn audio_without_transcriber_is_dropped() {
    let state = test_app_state();
    let meeting_id = Uuid::new_v4();
    assert_eq!(feed_audio(&state, meeting_id, &loud_frame()).await, None);
    assert!(!state.meetings.read().await.contains_key(&meeting_id));
}

#[tokio::test]
async fn full_window_is_transcribed_and_broadcast() {
    let stt = Arc::new(MockTranscriber::with_texts(&["  hello team  "]));
    let state = state_with(stt.clone());
    let meeting_id = Uuid::new_v4();
    ensure_pipeline(&state, meeting_id).await;
    let (_client, mut rx) = attach_client(&state, meeting_id).await;

    let mut recognized = None;
    for _ in 0..10 {
        if let Some(text) = feed_audio(&state, meeting_id, &loud_frame()).await {
            recognized = Some(text);
        }
    }

    assert_eq!(recognized.as_deref(), Some("hello team"));
    assert_eq!(stt.call_count(), 1);
    let (len, name) = stt.calls.lock().unwrap()[0].clone();
    assert_eq!(name, "audio.wav");
    assert_eq!(len, 44 + 3200);
    assert_eq!(rx.recv().await, Some(LiveEvent::Transcript { text: "hello team".into() }));
}

#[tokio::test]
async fn silence_flushes_partial_chunk() {
    let stt = Arc::new(MockTranscriber::with_texts(&["short"]));
    let state = state_with(stt.clone());
    let meeting_id = Uuid::new_v4();
    ensure_pipeline(&state, meeting_id).await;

    for _ in 0..6 {
        assert_eq!(feed_audio(&state, meeting_id, &loud_frame()).await, None);
    }
    // Six buffered frames (3840 bytes) are released by the silent frame.
    assert_eq!(feed_audio(&state, meeting_id, &silent_frame()).await.as_deref(), Some("short"));
}

#[tokio::test]
async fn empty_transcription_is_not_published() {
    let stt = Arc::new(MockTranscriber::with_texts(&["   "]));
    let state = state_with(stt.clone());
    let meeting_id = Uuid::new_v4();
    ensure_pipeline(&state, meeting_id).await;
    let (_client, mut rx) = attach_client(&state, meeting_id).await;

    for _ in 0..10 {
        feed_audio(&state, meeting_id, &loud_frame()).await;
    }
    assert_eq!(stt.call_count(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn flush_transcribes_remainder_and_drops_pipeline() {
    let stt = Arc::new(MockTranscriber::with_texts(&["tail end"]));
    let state = state_with(stt.clone());
    let meeting_id = Uuid::new_v4();
    ensure_pipeline(&state, meeting_id).await;

    for _ in 0..3 {
        feed_audio(&state, meeting_id, &loud_frame()).await;
    }
    assert_eq!(stt.call_count(), 0);

    assert_eq!(flush_pipeline(&state, meeting_id).await.as_deref(), Some("tail end"));
    assert_eq!(stt.calls.lock().unwrap()[0].0, 44 + 3 * FRAME_BYTES);
    // Nothing else kept the room alive.
    assert!(!state.meetings.read().await.contains_key(&meeting_id));
    assert_eq!(flush_pipeline(&state, meeting_id).await, None);
}

#[tokio::test]
async fn transcriber_failure_is_swallowed() {
    let stt = Arc::new(MockTranscriber::failing());
    let state = state_with(stt.clone());
    let meeting_id = Uuid::new_v4();
    ensure_pipeline(&state, meeting_id).await;
    for _ in 0..10 {
        assert_eq!(feed_audio(&state, meeting_id, &loud_frame()).await, None);
    }
    assert_eq!(stt.call_count(), 1);
}

#[tokio::test]
async fn audio_for_meeting_without_pipeline_is_dropped() {
    let stt = Arc::new(MockTranscriber::with_texts(&["ghost"]));
    let state = state_with(stt.clone());
    let meeting_id = Uuid::new_v4();

    for _ in 0..10 {
        assert_eq!(feed_audio(&state, meeting_id, &loud_frame()).await, None);
    }
    assert_eq!(stt.call_count(), 0);
    assert!(!state.meetings.read().await.contains_key(&meeting_id));
}

#[tokio::test]
async fn late_frames_after_flush_do_not_revive_room() {
    let stt = Arc::new(MockTranscriber::with_texts(&[]));
    let state = state_with(stt.clone());
    let meeting_id = Uuid::new_v4();
    ensure_pipeline(&state, meeting_id).await;
    flush_pipeline(&state, meeting_id).await;

    assert_eq!(feed_audio(&state, meeting_id, &loud_frame()).await, None);
    assert!(!state.meetings.read().await.contains_key(&meeting_id));
}

#[tokio::test]
async fn feeding_refreshes_last_frame_time() {
    let stt = Arc::new(MockTranscriber::with_texts(&[]));
    let state = state_with(stt);
    let meeting_id = Uuid::new_v4();
    ensure_pipeline(&state, meeting_id).await;
    let stale = OffsetDateTime::now_utc() - time::Duration::hours(1);
    state.meetings.write().await.get_mut(&meeting_id).unwrap().audio.as_mut().unwrap().last_frame_at = stale;

    feed_audio(&state, meeting_id, &loud_frame()).await;
    let rooms = state.meetings.read().await;
    assert!(rooms[&meeting_id].audio.as_ref().unwrap().last_frame_at > stale);
}
