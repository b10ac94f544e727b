use super::*;
use time::macros::datetime;

#[test]
fn line_format_pads_clock() {
    let ts = datetime!(2025-06-01 9:05:07 UTC);
    assert_eq!(format_line(ts, "Ada", "hello there"), "[09:05:07] Ada: hello there");
}

#[test]
fn source_names_match_stored_values() {
    assert_eq!(TranscriptSource::Stt.as_str(), "stt");
    assert_eq!(TranscriptSource::JitsiBot.as_str(), "jitsi_bot");
    assert_eq!(TranscriptSource::Participant.as_str(), "participant");
}

#[test]
fn new_transcript_timestamp_is_optional() {
    let body = format!(r#"{{"meeting_id":"{}","text":"hi"}}"#, Uuid::nil());
    let input: NewTranscript = serde_json::from_str(&body).unwrap();
    assert!(input.timestamp.is_none());
}

// =============================================================================
// LIVE DB
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::db::test_support::{create_user, integration_pool};
    use crate::services::auth::Role;
    use crate::services::meeting::{NewMeeting, create_meeting};
    use crate::services::project::{NewProject, ProjectType, create_project, join_by_invite_code};

    #[tokio::test]
    async fn full_transcript_names_speakers() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Speaker", Role::Member).await;
        let meeting = create_meeting(&pool, user.id, NewMeeting::default()).await.unwrap();

        create_transcript(
            &pool,
            user.id,
            NewTranscript { meeting_id: meeting.id, text: "typed".into(), timestamp: Some(datetime!(2025-01-01 10:00 UTC)) },
        )
        .await
        .unwrap();
        record_line(
            &pool,
            &TranscriptLine {
                meeting_id: meeting.id,
                user_id: None,
                display_name: Some("Guest".into()),
                text: "spoken".into(),
                source: TranscriptSource::JitsiBot,
                timestamp: datetime!(2025-01-01 10:00:05 UTC),
            },
        )
        .await
        .unwrap();
        record_line(
            &pool,
            &TranscriptLine {
                meeting_id: meeting.id,
                user_id: None,
                display_name: None,
                text: "mystery".into(),
                source: TranscriptSource::Stt,
                timestamp: datetime!(2025-01-01 10:00:09 UTC),
            },
        )
        .await
        .unwrap();

        let full = full_transcript(&pool, user.id, meeting.id).await.unwrap();
        assert_eq!(
            full,
            "[10:00:00] Speaker: typed\n[10:00:05] Guest: spoken\n[10:00:09] Unknown: mystery"
        );
        assert_eq!(list_for_meeting(&pool, user.id, meeting.id, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_author_or_owner_may_delete() {
        let pool = integration_pool().await;
        let owner = create_user(&pool, "Chair", Role::Manager).await;
        let author = create_user(&pool, "Author", Role::Member).await;
        let other = create_user(&pool, "Other", Role::Member).await;
        let project = create_project(
            &pool,
            owner.id,
            NewProject { name: "Minutes".into(), description: None, invite_code: None, project_type: ProjectType::Workspace },
        )
        .await
        .unwrap();
        join_by_invite_code(&pool, &project.invite_code, author.id).await.unwrap();
        join_by_invite_code(&pool, &project.invite_code, other.id).await.unwrap();
        let meeting = create_meeting(&pool, owner.id, NewMeeting { project_id: Some(project.id), ..NewMeeting::default() })
            .await
            .unwrap();

        let first = create_transcript(&pool, author.id, NewTranscript { meeting_id: meeting.id, text: "one".into(), timestamp: None })
            .await
            .unwrap();
        let second = create_transcript(&pool, author.id, NewTranscript { meeting_id: meeting.id, text: "two".into(), timestamp: None })
            .await
            .unwrap();

        assert!(matches!(delete_transcript(&pool, other.id, first.id).await, Err(TranscriptError::Forbidden)));
        delete_transcript(&pool, author.id, first.id).await.unwrap();
        delete_transcript(&pool, owner.id, second.id).await.unwrap();
        assert!(matches!(delete_transcript(&pool, owner.id, second.id).await, Err(TranscriptError::NotFound)));
    }
}
