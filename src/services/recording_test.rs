use super::*;

#[test]
fn title_defaults_to_file_name() {
    assert_eq!(default_title(None, "standup.m4a"), "standup.m4a");
    assert_eq!(default_title(Some("  "), "standup.m4a"), "standup.m4a");
    assert_eq!(default_title(Some(" Weekly sync "), "standup.m4a"), "Weekly sync");
}

#[test]
fn too_large_message_reports_megabytes() {
    let err = RecordingError::TooLarge { max_mb: max_mb(25 * 1024 * 1024) };
    assert_eq!(err.to_string(), "File too large. Maximum size is 25 MB");
}

#[test]
fn processing_error_keeps_cause() {
    assert_eq!(RecordingError::Processing("timeout".into()).to_string(), "Processing failed: timeout");
}

#[cfg(feature = "live-db-tests")]
mod live {
    use std::sync::Arc;

    use super::*;
    use crate::db::test_support::{create_user, integration_pool};
    use crate::llm::mock::{MockLlm, MockTranscriber};
    use crate::llm::{LlmChat, Transcriber};
    use crate::services::auth::Role;
    use crate::state::test_helpers::{test_app_state_full, test_config};

    const SUMMARY_REPLY: &str =
        r#"{"overview":"Quarterly review","key_points":["Revenue up"],"decisions":[],"action_items":["Email board"]}"#;

    fn upload(user_id: Uuid, bytes: usize) -> RecordingUpload {
        RecordingUpload {
            user_id,
            project_id: None,
            title: None,
            file_name: "review.m4a".into(),
            bytes: vec![1; bytes],
        }
    }

    fn state_with(pool: PgPool, llm: Option<Arc<MockLlm>>, stt: Option<Arc<MockTranscriber>>) -> AppState {
        let mut config = test_config();
        config.max_upload_bytes = 1024;
        let mut state = test_app_state_full(
            config,
            llm.map(|l| l as Arc<dyn LlmChat>),
            stt.map(|s| s as Arc<dyn Transcriber>),
        );
        state.pool = pool;
        state
    }

    #[tokio::test]
    async fn upload_is_transcribed_and_summarized() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Uploader", Role::Member).await;
        let stt = Arc::new(MockTranscriber::with_texts(&["Revenue was up this quarter."]));
        let llm = Arc::new(MockLlm::with_replies(&[SUMMARY_REPLY]));
        let state = state_with(pool.clone(), Some(llm), Some(stt.clone()));

        let recording = process_upload(&state, upload(user.id, 512)).await.unwrap();
        assert_eq!(recording.status, "completed");
        assert_eq!(recording.title, "review.m4a");
        assert_eq!(recording.transcription.as_deref(), Some("Revenue was up this quarter."));
        assert_eq!(recording.summary, recording.summary_dict);
        assert_eq!(recording.action_items, serde_json::json!(["Email board"]));
        assert_eq!(stt.calls.lock().unwrap()[0].1, "audio.m4a");

        let listed = list_recordings(&pool, user.id, None).await.unwrap();
        assert_eq!(listed[0].id, recording.id);
    }

    #[tokio::test]
    async fn silent_recording_gets_placeholder_text() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Quiet", Role::Member).await;
        let state = state_with(
            pool,
            Some(Arc::new(MockLlm::with_replies(&[SUMMARY_REPLY]))),
            Some(Arc::new(MockTranscriber::with_texts(&["  "]))),
        );

        let recording = process_upload(&state, upload(user.id, 16)).await.unwrap();
        assert_eq!(recording.transcription.as_deref(), Some(NO_SPEECH_TEXT));
    }

    #[tokio::test]
    async fn oversized_upload_is_stored_as_failed() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Big", Role::Member).await;
        let stt = Arc::new(MockTranscriber::with_texts(&["never"]));
        let state = state_with(pool.clone(), Some(Arc::new(MockLlm::default())), Some(stt.clone()));

        let err = process_upload(&state, upload(user.id, 4096)).await.unwrap_err();
        assert!(matches!(err, RecordingError::TooLarge { .. }));
        assert_eq!(stt.call_count(), 0);

        let failed = &list_recordings(&pool, user.id, None).await.unwrap()[0];
        assert_eq!(failed.status, "failed");
        assert!(failed.error.as_deref().unwrap().starts_with("File too large"));
    }

    #[tokio::test]
    async fn rejected_upload_leaves_failed_row() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Huge", Role::Member).await;
        let stt = Arc::new(MockTranscriber::with_texts(&["never"]));
        let state = state_with(pool.clone(), Some(Arc::new(MockLlm::default())), Some(stt.clone()));

        let meta = RecordingUpload { title: Some("All hands".into()), ..upload(user.id, 0) };
        let err = reject_oversized(&state, &meta).await;
        assert!(matches!(err, RecordingError::TooLarge { max_mb: 0 }));
        assert_eq!(stt.call_count(), 0);

        let failed = &list_recordings(&pool, user.id, None).await.unwrap()[0];
        assert_eq!(failed.status, "failed");
        assert_eq!(failed.title, "All hands");
        assert!(failed.error.as_deref().unwrap().starts_with("File too large"));
    }

    #[tokio::test]
    async fn missing_ai_is_not_configured() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "NoAi", Role::Member).await;
        let state = state_with(pool, None, None);
        assert!(matches!(process_upload(&state, upload(user.id, 16)).await, Err(RecordingError::NotConfigured)));
    }

    #[tokio::test]
    async fn transcriber_failure_is_processing_error() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Broken", Role::Member).await;
        let state = state_with(pool, Some(Arc::new(MockLlm::default())), Some(Arc::new(MockTranscriber::failing())));
        assert!(matches!(process_upload(&state, upload(user.id, 16)).await, Err(RecordingError::Processing(_))));
    }

    #[tokio::test]
    async fn recordings_are_private() {
        let pool = integration_pool().await;
        let owner = create_user(&pool, "Keeper", Role::Member).await;
        let other = create_user(&pool, "Peeker", Role::Member).await;
        let state = state_with(pool.clone(), None, None);
        let _ = process_upload(&state, upload(owner.id, 16)).await;
        let recording = list_recordings(&pool, owner.id, None).await.unwrap().remove(0);

        assert!(get_recording(&pool, owner.id, recording.id).await.is_ok());
        assert!(matches!(get_recording(&pool, other.id, recording.id).await, Err(RecordingError::Forbidden)));
        assert!(matches!(get_recording(&pool, owner.id, Uuid::new_v4()).await, Err(RecordingError::NotFound)));
    }
}
