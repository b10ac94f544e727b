use super::*;
use time::macros::datetime;

fn meeting_at(started_at: Option<OffsetDateTime>, ended_at: Option<OffsetDateTime>) -> Meeting {
    Meeting {
        id: Uuid::new_v4(),
        project_id: None,
        title: "Standup".into(),
        room_name: None,
        kind: MeetingKind::Scheduled,
        status: MeetingStatus::Scheduled,
        meeting_url: None,
        start_time: None,
        started_at,
        ended_at,
        created_by: None,
        created_at: datetime!(2025-02-01 9:00 UTC),
    }
}

fn record(participant_id: &str) -> ParticipantRecord {
    ParticipantRecord {
        id: Uuid::new_v4(),
        meeting_id: Uuid::nil(),
        participant_id: participant_id.into(),
        display_name: participant_id.into(),
        meeting_role: "participant".into(),
        join_time: datetime!(2025-02-01 9:00 UTC),
        leave_time: None,
        duration_seconds: None,
    }
}

#[test]
fn room_name_embeds_project_and_random_suffix() {
    let project_id = Uuid::new_v4();
    let a = generate_room_name(project_id);
    let b = generate_room_name(project_id);
    let prefix = format!("mm-{project_id}-");
    assert!(a.starts_with(&prefix));
    let suffix = &a[prefix.len()..];
    assert_eq!(suffix.len(), 12);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
}

#[test]
fn jitsi_url_joins_without_double_slash() {
    assert_eq!(jitsi_url("https://meet.jit.si/", "room-1"), "https://meet.jit.si/room-1");
    assert_eq!(jitsi_url("https://meet.jit.si", "room-1"), "https://meet.jit.si/room-1");
}

#[test]
fn duration_needs_both_ends() {
    let start = datetime!(2025-02-01 9:00 UTC);
    assert_eq!(total_duration(&meeting_at(Some(start), Some(datetime!(2025-02-01 9:45:30 UTC)))), Some(2730));
    assert_eq!(total_duration(&meeting_at(Some(start), None)), None);
    assert_eq!(total_duration(&meeting_at(None, None)), None);
}

#[test]
fn rejoins_count_once() {
    let records = vec![record("alice"), record("bob"), record("alice")];
    assert_eq!(distinct_participants(&records), 2);
    assert_eq!(distinct_participants(&[]), 0);
}

#[test]
fn participant_event_accepts_runner_aliases() {
    let event: ParticipantEvent =
        serde_json::from_str(r#"{"id": "p-7", "display_name": "  ", "meeting_role": "moderator"}"#).unwrap();
    assert_eq!(event.participant_id, "p-7");
    assert_eq!(event.display_name(), "p-7");
    assert_eq!(event.meeting_role.as_deref(), Some("moderator"));

    let event: ParticipantEvent = serde_json::from_str(r#"{"participant_id": "p-8", "name": "Grace"}"#).unwrap();
    assert_eq!(event.display_name(), "Grace");
}

#[test]
fn instant_meeting_json_is_camel_case() {
    let instant = InstantMeeting { meeting_id: Uuid::nil(), room_name: "mm-x".into(), jitsi_url: "https://j/mm-x".into() };
    let json = serde_json::to_value(&instant).unwrap();
    assert_eq!(json["roomName"], "mm-x");
    assert_eq!(json["jitsiUrl"], "https://j/mm-x");
    assert!(json.get("meetingId").is_some());
}

#[test]
fn meeting_json_names_kind_type() {
    let json = serde_json::to_value(meeting_at(None, None)).unwrap();
    assert_eq!(json["type"], "scheduled");
    assert_eq!(json["status"], "scheduled");
    assert_eq!(json["started_at"], serde_json::Value::Null);
}

#[test]
fn blank_title_falls_back() {
    assert_eq!(clean_title(Some("   ")), "Meeting");
    assert_eq!(clean_title(Some(" Retro ")), "Retro");
    assert_eq!(clean_url(Some(" ")), None);
}

#[tokio::test]
async fn start_surfaces_database_errors_without_touching_rooms() {
    let state = crate::state::test_helpers::test_app_state();
    let meeting_id = Uuid::new_v4();
    // The lazy pool has no database behind it, so the lookup itself fails.
    let err = start_live(&state, meeting_id, Uuid::new_v4(), StartMeeting::default()).await.unwrap_err();
    assert!(matches!(err, MeetingError::Database(_)));
    assert!(!state.meetings.read().await.contains_key(&meeting_id));
}

#[tokio::test]
async fn failed_join_write_releases_dedupe_slot() {
    let state = crate::state::test_helpers::test_app_state();
    let meeting_id = Uuid::new_v4();

    let failed: Result<Option<()>, &str> = join_once(&state, meeting_id, "p-1", "Ada", || async { Err("db down") }).await;
    assert_eq!(failed, Err("db down"));
    assert!(!state.meetings.read().await.contains_key(&meeting_id));

    let retried: Result<Option<u8>, &str> = join_once(&state, meeting_id, "p-1", "Ada", || async { Ok(7) }).await;
    assert_eq!(retried, Ok(Some(7)));

    let duplicate: Result<Option<u8>, &str> = join_once(&state, meeting_id, "p-1", "Ada", || async { Ok(8) }).await;
    assert_eq!(duplicate, Ok(None));
}

#[tokio::test]
async fn failed_join_keeps_other_participants_deduped() {
    let state = crate::state::test_helpers::test_app_state();
    let meeting_id = Uuid::new_v4();

    let first: Result<Option<()>, &str> = join_once(&state, meeting_id, "p-1", "Ada", || async { Ok(()) }).await;
    assert_eq!(first, Ok(Some(())));
    let failed: Result<Option<()>, &str> = join_once(&state, meeting_id, "p-2", "Bo", || async { Err("boom") }).await;
    assert!(failed.is_err());

    let again: Result<Option<()>, &str> = join_once(&state, meeting_id, "p-1", "Ada", || async { Ok(()) }).await;
    assert_eq!(again, Ok(None));
}

// =============================================================================
// LIVE DB
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use std::sync::Arc;

    use super::*;
    use crate::db::test_support::{create_user, integration_pool};
    use crate::llm::LlmChat;
    use crate::llm::mock::MockLlm;
    use crate::services::auth::Role;
    use crate::services::bot::{BotError, BotLaunch, BotLauncher, BotManager, BotProcess, BotSettings};
    use crate::services::project::{NewProject, ProjectType, create_project};
    use crate::state::test_helpers::{test_app_state, test_app_state_with_ai};

    /// Bot that crashes right after launch.
    struct CrashingProcess;

    #[async_trait::async_trait]
    impl BotProcess for CrashingProcess {
        async fn wait(&mut self) -> Result<Option<i32>, BotError> {
            Ok(Some(1))
        }

        async fn kill(&mut self) -> Result<(), BotError> {
            Ok(())
        }
    }

    struct CrashingLauncher;

    impl BotLauncher for CrashingLauncher {
        fn launch(&self, _launch: &BotLaunch) -> Result<Box<dyn BotProcess>, BotError> {
            Ok(Box::new(CrashingProcess))
        }
    }

    async fn project_for(pool: &PgPool, owner: Uuid) -> Uuid {
        create_project(
            pool,
            owner,
            NewProject { name: "Meetings".into(), description: None, invite_code: None, project_type: ProjectType::Workspace },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn instant_meeting_is_live_with_room() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Host", Role::Manager).await;
        let project_id = project_for(&pool, user.id).await;

        let instant = start_instant(&pool, "https://meet.example/", user.id, project_id).await.unwrap();
        assert_eq!(instant.jitsi_url, format!("https://meet.example/{}", instant.room_name));

        let meeting = find_meeting(&pool, instant.meeting_id).await.unwrap().unwrap();
        assert_eq!(meeting.kind, MeetingKind::Instant);
        assert_eq!(meeting.status, MeetingStatus::Live);
        assert!(meeting.started_at.is_some());
    }

    #[tokio::test]
    async fn outsiders_cannot_see_project_meetings() {
        let pool = integration_pool().await;
        let owner = create_user(&pool, "Owner", Role::Manager).await;
        let outsider = create_user(&pool, "Outsider", Role::Member).await;
        let project_id = project_for(&pool, owner.id).await;
        let meeting = create_meeting(&pool, owner.id, NewMeeting { project_id: Some(project_id), ..NewMeeting::default() })
            .await
            .unwrap();

        let err = meeting_detail(&pool, meeting.id, outsider.id).await.unwrap_err();
        assert!(matches!(err, MeetingError::Project(ProjectError::Forbidden)));
        assert!(list_meetings(&pool, outsider.id, None).await.unwrap().iter().all(|m| m.id != meeting.id));
    }

    #[tokio::test]
    async fn private_meeting_visible_only_to_creator() {
        let pool = integration_pool().await;
        let creator = create_user(&pool, "Solo", Role::Member).await;
        let other = create_user(&pool, "Other", Role::Member).await;
        let meeting = create_meeting(&pool, creator.id, NewMeeting::default()).await.unwrap();

        assert!(require_access(&pool, meeting.id, creator.id).await.is_ok());
        assert!(matches!(require_access(&pool, meeting.id, other.id).await, Err(MeetingError::Forbidden)));
    }

    #[tokio::test]
    async fn start_requires_a_meeting_url() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "NoUrl", Role::Member).await;
        let meeting = create_meeting(&pool, user.id, NewMeeting::default()).await.unwrap();
        let mut state = test_app_state();
        state.pool = pool.clone();

        let err = start_live(&state, meeting.id, user.id, StartMeeting::default()).await.unwrap_err();
        assert!(matches!(err, MeetingError::MissingMeetingUrl));
        let unchanged = find_meeting(&pool, meeting.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, MeetingStatus::Scheduled);
    }

    #[tokio::test]
    async fn start_then_stop_summarizes_transcript() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Lead", Role::Manager).await;
        let project_id = project_for(&pool, user.id).await;
        let llm = Arc::new(MockLlm::with_replies(&[
            r#"{"overview":"Planning sync","key_points":["Budget approved"],"decisions":[],"action_items":["Send minutes"]}"#,
        ]));
        let mut state = test_app_state_with_ai(Some(llm.clone() as Arc<dyn LlmChat>), None);
        state.pool = pool.clone();

        let meeting_id = Uuid::new_v4();
        let started = start_live(
            &state,
            meeting_id,
            user.id,
            StartMeeting {
                meeting_url: Some("https://meet.example/planning".into()),
                project_id: Some(project_id),
                title: Some("Planning".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(started.status, MeetingStatus::Live);
        assert_eq!(started.kind, MeetingKind::Instant);
        assert!(state.meetings.read().await[&meeting_id].audio.is_some());

        transcript::record_segment(&pool, meeting_id, "We approved the budget.", OffsetDateTime::now_utc())
            .await
            .unwrap();

        let stopped = stop_live(&state, meeting_id, user.id).await.unwrap();
        assert_eq!(stopped.status, MeetingStatus::Ended);
        assert!(total_duration(&stopped).is_some());
        assert!(!state.meetings.read().await.contains_key(&meeting_id));
        assert_eq!(llm.call_count(), 1);

        let detail = meeting_detail(&pool, meeting_id, user.id).await.unwrap();
        assert!(detail.summary.unwrap().summary_text.starts_with("Planning sync"));
        assert_eq!(detail.action_items.len(), 1);
        assert_eq!(detail.transcript_segments.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_bot_joins_are_ignored() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Watcher", Role::Member).await;
        let meeting = create_meeting(&pool, user.id, NewMeeting::default()).await.unwrap();
        let mut state = test_app_state();
        state.pool = pool.clone();

        let event = ParticipantEvent { participant_id: "p-1".into(), name: Some("Ada".into()), meeting_role: None };
        assert!(participant_joined(&state, meeting.id, &event).await.unwrap());
        assert!(!participant_joined(&state, meeting.id, &event).await.unwrap());

        let closed = participant_left(&state, meeting.id, "p-1").await.unwrap().unwrap();
        assert!(closed.leave_time.is_some());
        assert_eq!(attendance::list_participants(&pool, meeting.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hooks_reject_unknown_meetings() {
        let mut state = test_app_state();
        state.pool = integration_pool().await;
        let event = ParticipantEvent { participant_id: "p".into(), name: None, meeting_role: None };
        assert!(matches!(participant_joined(&state, Uuid::new_v4(), &event).await, Err(MeetingError::NotFound)));
        assert!(matches!(participant_left(&state, Uuid::new_v4(), "p").await, Err(MeetingError::NotFound)));
    }

    #[tokio::test]
    async fn stop_closes_attendance_of_crashed_bot() {
        let pool = integration_pool().await;
        let user = create_user(&pool, "Crash", Role::Member).await;
        let mut state = test_app_state();
        state.pool = pool.clone();
        let bots = BotManager::new(Some(Arc::new(CrashingLauncher)), BotSettings::from_config(&state.config));
        let state = state.with_bots(bots);

        let meeting_id = Uuid::new_v4();
        let input = StartMeeting { meeting_url: Some("https://meet.example/crash".into()), ..StartMeeting::default() };
        start_live(&state, meeting_id, user.id, input).await.unwrap();

        for _ in 0..100 {
            if !state.bots.is_running(meeting_id) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!state.bots.is_running(meeting_id));

        stop_live(&state, meeting_id, user.id).await.unwrap();

        let records = attendance::list_participants(&pool, meeting_id).await.unwrap();
        let bot = records.iter().find(|r| r.participant_id == BOT_PARTICIPANT_ID).unwrap();
        assert!(bot.leave_time.is_some());
    }
}
