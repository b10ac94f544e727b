use super::*;
use time::macros::datetime;

fn sample_task() -> Task {
    Task {
        id: Uuid::new_v4(),
        project_id: Uuid::new_v4(),
        title: "Write report".into(),
        description: None,
        status: TaskStatus::Todo,
        priority: TaskPriority::Medium,
        assignee_id: None,
        due_date: None,
        subtasks: Value::Array(vec![]),
        source_meeting_id: None,
        is_auto_generated: false,
        created_at: datetime!(2025-01-01 0:00 UTC),
        updated_at: datetime!(2025-01-01 0:00 UTC),
        completed_at: None,
    }
}

// =============================================================================
// status / priority
// =============================================================================

#[test]
fn legacy_statuses_are_normalized() {
    assert_eq!(TaskStatus::normalize("in-progress"), Some(TaskStatus::InProgress));
    assert_eq!(TaskStatus::normalize("review"), Some(TaskStatus::InReview));
    assert_eq!(TaskStatus::normalize("blocked"), Some(TaskStatus::Blockers));
    assert_eq!(TaskStatus::normalize(" DONE "), Some(TaskStatus::Done));
    assert_eq!(TaskStatus::normalize("archived"), None);
}

#[test]
fn every_status_round_trips() {
    for status in TaskStatus::ALL {
        assert_eq!(TaskStatus::normalize(status.as_str()), Some(status));
        assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
    }
}

#[test]
fn priority_defaults_to_medium() {
    assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    assert_eq!(TaskPriority::parse("URGENT"), Some(TaskPriority::Urgent));
    assert_eq!(TaskPriority::parse("critical"), None);
}

#[test]
fn deadlines_accept_rfc3339_and_dates() {
    assert_eq!(parse_deadline("2025-03-04"), Some(datetime!(2025-03-04 0:00 UTC)));
    assert_eq!(parse_deadline("2025-03-04T10:30:00Z"), Some(datetime!(2025-03-04 10:30 UTC)));
    assert_eq!(parse_deadline("next friday"), None);
    assert_eq!(parse_deadline("  "), None);
}

// =============================================================================
// drafts
// =============================================================================

#[test]
fn new_task_defaults() {
    let input: NewTask = serde_json::from_str(r#"{"title":"  Ship it  "}"#).unwrap();
    let project_id = Uuid::new_v4();
    let draft = input.into_draft(project_id).unwrap();
    assert_eq!(draft.project_id, project_id);
    assert_eq!(draft.title, "Ship it");
    assert_eq!(draft.status, TaskStatus::Todo);
    assert_eq!(draft.priority, TaskPriority::Medium);
    assert_eq!(draft.subtasks, serde_json::json!([]));
    assert!(!draft.is_auto_generated);
}

#[test]
fn new_task_rejects_bad_input() {
    let blank = NewTask { title: "   ".into(), ..NewTask::default() };
    assert!(matches!(blank.into_draft(Uuid::new_v4()), Err(TaskError::MissingTitle)));

    let bad_status = NewTask { title: "x".into(), status: Some("someday".into()), ..NewTask::default() };
    assert!(matches!(bad_status.into_draft(Uuid::new_v4()), Err(TaskError::InvalidStatus)));

    let bad_due = NewTask { title: "x".into(), due_date: Some("tomorrow".into()), ..NewTask::default() };
    assert!(matches!(bad_due.into_draft(Uuid::new_v4()), Err(TaskError::InvalidDueDate)));
}

// =============================================================================
// apply_update
// =============================================================================

#[test]
fn marking_done_stamps_completed_at() {
    let mut task = sample_task();
    let now = datetime!(2025-02-01 12:00 UTC);
    let update = TaskUpdate { status: Some("done".into()), ..TaskUpdate::default() };
    apply_update(&mut task, update, now).unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.completed_at, Some(now));
    assert_eq!(task.updated_at, now);
}

#[test]
fn explicit_completed_at_wins() {
    let mut task = sample_task();
    let supplied = datetime!(2025-01-15 9:00 UTC);
    let update = TaskUpdate {
        status: Some("done".into()),
        completed_at: Some(supplied),
        ..TaskUpdate::default()
    };
    apply_update(&mut task, update, datetime!(2025-02-01 12:00 UTC)).unwrap();
    assert_eq!(task.completed_at, Some(supplied));
}

#[test]
fn partial_update_leaves_other_fields() {
    let mut task = sample_task();
    task.description = Some("keep me".into());
    let update = TaskUpdate { priority: Some("high".into()), ..TaskUpdate::default() };
    apply_update(&mut task, update, OffsetDateTime::now_utc()).unwrap();
    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(task.description.as_deref(), Some("keep me"));
    assert_eq!(task.title, "Write report");
    assert_eq!(task.completed_at, None);
}

#[test]
fn update_with_blank_title_fails() {
    let mut task = sample_task();
    let update = TaskUpdate { title: Some(" ".into()), ..TaskUpdate::default() };
    assert!(matches!(
        apply_update(&mut task, update, OffsetDateTime::now_utc()),
        Err(TaskError::MissingTitle)
    ));
}

// =============================================================================
// LIVE DB
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::db::test_support::{create_user, integration_pool};
    use crate::services::auth::Role;
    use crate::services::project::{NewProject, ProjectType, create_project};

    #[tokio::test]
    async fn create_list_update_delete() {
        let pool = integration_pool().await;
        let owner = create_user(&pool, "TaskOwner", Role::Manager).await;
        let project = create_project(
            &pool,
            owner.id,
            NewProject { name: "Board".into(), description: None, invite_code: None, project_type: ProjectType::Workspace },
        )
        .await
        .unwrap();

        let task = create_task(
            &pool,
            owner.id,
            Some(project.id),
            NewTask { title: "Draft agenda".into(), status: Some("in-progress".into()), ..NewTask::default() },
        )
        .await
        .unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);

        let listed = list_tasks(&pool, owner.id, TaskFilter::default()).await.unwrap();
        assert!(listed.iter().any(|t| t.id == task.id));
        let filtered = list_tasks(
            &pool,
            owner.id,
            TaskFilter { project_id: Some(project.id), status: Some("done".into()), ..TaskFilter::default() },
        )
        .await
        .unwrap();
        assert!(filtered.is_empty());

        let done = update_task(
            &pool,
            owner.id,
            task.id,
            None,
            TaskUpdate { status: Some("done".into()), ..TaskUpdate::default() },
        )
        .await
        .unwrap();
        assert!(done.completed_at.is_some());

        delete_task(&pool, owner.id, task.id).await.unwrap();
        assert!(matches!(get_task(&pool, owner.id, task.id).await, Err(TaskError::NotFound)));
    }

    #[tokio::test]
    async fn outsiders_cannot_read_tasks() {
        let pool = integration_pool().await;
        let owner = create_user(&pool, "Keeper", Role::Manager).await;
        let outsider = create_user(&pool, "Peeker", Role::Member).await;
        let project = create_project(
            &pool,
            owner.id,
            NewProject { name: "Secret".into(), description: None, invite_code: None, project_type: ProjectType::Workspace },
        )
        .await
        .unwrap();
        let task = create_task(&pool, owner.id, Some(project.id), NewTask { title: "Hidden".into(), ..NewTask::default() })
            .await
            .unwrap();

        assert!(matches!(
            get_task(&pool, outsider.id, task.id).await,
            Err(TaskError::Project(ProjectError::Forbidden))
        ));
        let visible = list_tasks(&pool, outsider.id, TaskFilter::default()).await.unwrap();
        assert!(visible.iter().all(|t| t.id != task.id));
    }
}
