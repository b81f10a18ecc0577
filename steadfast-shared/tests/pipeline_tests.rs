/// Pipeline and domain operation tests against PostgreSQL
///
/// Skipped when `DATABASE_URL` is not set. Every test creates its own rows
/// with unique emails, so the suite can share one database.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use steadfast_shared::db::migrations::run_migrations;
use steadfast_shared::db::pool::{create_pool, DatabaseConfig};
use steadfast_shared::error::ServiceError;
use steadfast_shared::integrations::{DeliveryError, DeliveryProvider, DeliveryReport, DeliveryRequest};
use steadfast_shared::models::blocked_user::{
    BlockStatus, BlockedUser, BlockedUserResource, CreateBlockedUser, UpdateBlockedUser,
};
use steadfast_shared::models::notification::{
    CreateNotification, Notification, NotificationResource, NotificationStatus,
};
use steadfast_shared::models::relapse::{CreateRelapse, RelapseResource};
use steadfast_shared::models::streak::{CreateStreak, Streak, StreakResource, StreakStatus};
use steadfast_shared::models::task::{CreateTask, Task, TaskFilters, TaskResource, TaskStatus, UpdateTask};
use steadfast_shared::models::user::{CreateUser, User, UserResource, UserStatus};
use steadfast_shared::service::pagination::ListOptions;
use steadfast_shared::service::pipeline::{
    run_bulk_create, run_bulk_delete, run_count, run_create, run_delete, run_get, run_list,
    run_stats, run_update,
};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let pool = create_pool(DatabaseConfig {
        url,
        max_connections: 5,
        ..Default::default()
    })
    .await
    .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Migrations failed");
    Some(pool)
}

fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4().simple())
}

async fn create_user(db: &PgPool) -> User {
    run_create::<UserResource>(
        db,
        None,
        CreateUser {
            email: unique_email(),
            name: "Test User".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to create user")
}

#[tokio::test]
async fn test_create_collects_every_violation() {
    let Some(db) = test_pool().await else { return };

    let err = run_create::<UserResource>(
        &db,
        None,
        CreateUser {
            email: "not-an-email".to_string(),
            name: "A".to_string(),
            status: Some("sleeping".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    match err {
        ServiceError::Validation(violations) => {
            let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
            assert!(fields.contains(&"email"));
            assert!(fields.contains(&"name"));
            assert!(fields.contains(&"status"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let err = run_create::<UserResource>(
        &db,
        None,
        CreateUser {
            email: user.email.to_uppercase(),
            name: "Copy".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(err.is_validation() || matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn test_user_soft_delete_and_transitions() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    assert_eq!(user.status, UserStatus::Active);

    let suspended = User::suspend(&db, None, user.id).await.unwrap();
    assert_eq!(suspended.status, UserStatus::Suspended);

    run_delete::<UserResource>(&db, None, user.id).await.unwrap();
    let deleted = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(deleted.status, UserStatus::Inactive);
}

#[tokio::test]
async fn test_task_completion_stamp_and_illegal_transition() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let task = run_create::<TaskResource>(
        &db,
        None,
        CreateTask {
            user_id: user.id,
            title: "Morning walk".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.completed_at.is_none());

    let completed = Task::complete(&db, None, task.id).await.unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(completed.completed_at.is_some());

    let archived = Task::archive(&db, None, task.id).await.unwrap();
    assert_eq!(archived.status, TaskStatus::Archived);

    let err = run_update::<TaskResource>(
        &db,
        None,
        task.id,
        UpdateTask {
            status: Some("in_progress".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(err.is_validation());

    let unchanged = run_get::<TaskResource>(&db, task.id).await.unwrap();
    assert_eq!(unchanged.status, TaskStatus::Archived);
}

#[tokio::test]
async fn test_list_filters_by_user() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let items: Vec<CreateTask> = (0..3)
        .map(|i| CreateTask {
            user_id: user.id,
            title: format!("Task number {}", i),
            ..Default::default()
        })
        .collect();
    let inserted = run_bulk_create::<TaskResource>(&db, None, items).await.unwrap();
    assert_eq!(inserted, 3);

    let filters = TaskFilters {
        user_id: Some(user.id),
        ..Default::default()
    };
    let page = run_list::<TaskResource>(&db, &ListOptions::new(Some(1), Some(2)), &filters)
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.total_pages, 2);
    assert_eq!(page.data.len(), 2);
    assert!(page.data.iter().all(|t| t.user_id == user.id));
}

#[tokio::test]
async fn test_bulk_create_skips_duplicates() {
    let Some(db) = test_pool().await else { return };

    let email = unique_email();
    let items = vec![
        CreateUser {
            email: email.clone(),
            name: "First".to_string(),
            ..Default::default()
        },
        CreateUser {
            email,
            name: "Second".to_string(),
            ..Default::default()
        },
    ];
    let inserted = run_bulk_create::<UserResource>(&db, None, items).await.unwrap();
    assert_eq!(inserted, 1);
}

#[tokio::test]
async fn test_streak_check_in_and_relapse() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let streak = run_create::<StreakResource>(
        &db,
        None,
        CreateStreak {
            user_id: user.id,
            habit: "No alcohol".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let streak = Streak::check_in(&db, None, streak.id).await.unwrap();
    let streak = Streak::check_in(&db, None, streak.id).await.unwrap();
    assert_eq!(streak.current_count, 2);
    assert_eq!(streak.longest_count, 2);
    assert!(streak.last_check_in_at.is_some());

    run_create::<RelapseResource>(
        &db,
        None,
        CreateRelapse {
            user_id: user.id,
            streak_id: Some(streak.id),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let broken = run_get::<StreakResource>(&db, streak.id).await.unwrap();
    assert_eq!(broken.status, StreakStatus::Broken);
    assert_eq!(broken.current_count, 0);
    assert_eq!(broken.longest_count, 2);

    let err = Streak::check_in(&db, None, streak.id).await.unwrap_err();
    assert!(err.is_validation());

    let restarted = Streak::restart(&db, None, streak.id).await.unwrap();
    assert_eq!(restarted.status, StreakStatus::Active);
    assert_eq!(restarted.current_count, 0);
}

#[tokio::test]
async fn test_relapse_with_foreign_streak_is_rejected() {
    let Some(db) = test_pool().await else { return };

    let owner = create_user(&db).await;
    let other = create_user(&db).await;
    let streak = run_create::<StreakResource>(
        &db,
        None,
        CreateStreak {
            user_id: owner.id,
            habit: "Meditation".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let err = run_create::<RelapseResource>(
        &db,
        None,
        CreateRelapse {
            user_id: other.id,
            streak_id: Some(streak.id),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(err.is_validation());

    let untouched = run_get::<StreakResource>(&db, streak.id).await.unwrap();
    assert_eq!(untouched.status, StreakStatus::Active);
}

#[tokio::test]
async fn test_get_unknown_id_is_not_found() {
    let Some(db) = test_pool().await else { return };

    let err = run_get::<TaskResource>(&db, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

async fn create_task(db: &PgPool, user_id: Uuid, title: &str) -> Task {
    run_create::<TaskResource>(
        db,
        None,
        CreateTask {
            user_id,
            title: title.to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to create task")
}

async fn create_streak(db: &PgPool, user_id: Uuid) -> Streak {
    run_create::<StreakResource>(
        db,
        None,
        CreateStreak {
            user_id,
            habit: "No sugar".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to create streak")
}

fn permanent_block(user_id: Uuid) -> CreateBlockedUser {
    CreateBlockedUser {
        user_id,
        reason: "Spam reports".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_bulk_relapse_with_foreign_streak_is_rejected() {
    let Some(db) = test_pool().await else { return };

    let owner = create_user(&db).await;
    let other = create_user(&db).await;
    let streak = create_streak(&db, owner.id).await;

    let err = run_bulk_create::<RelapseResource>(
        &db,
        None,
        vec![CreateRelapse {
            user_id: other.id,
            streak_id: Some(streak.id),
            ..Default::default()
        }],
    )
    .await
    .unwrap_err();

    match err {
        ServiceError::Validation(violations) => {
            assert!(violations.iter().any(|v| v.field == "items[0].streak_id"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let untouched = run_get::<StreakResource>(&db, streak.id).await.unwrap();
    assert_eq!(untouched.status, StreakStatus::Active);
}

#[tokio::test]
async fn test_bulk_relapse_breaks_streak() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let streak = create_streak(&db, user.id).await;
    let streak = Streak::check_in(&db, None, streak.id).await.unwrap();
    assert_eq!(streak.current_count, 1);

    let inserted = run_bulk_create::<RelapseResource>(
        &db,
        None,
        vec![CreateRelapse {
            user_id: user.id,
            streak_id: Some(streak.id),
            ..Default::default()
        }],
    )
    .await
    .unwrap();
    assert_eq!(inserted, 1);

    let broken = run_get::<StreakResource>(&db, streak.id).await.unwrap();
    assert_eq!(broken.status, StreakStatus::Broken);
    assert_eq!(broken.current_count, 0);
}

#[tokio::test]
async fn test_bulk_block_marks_user_blocked() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let inserted = run_bulk_create::<BlockedUserResource>(&db, None, vec![permanent_block(user.id)])
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let blocked = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(blocked.status, UserStatus::Blocked);
}

#[tokio::test]
async fn test_deleting_last_block_restores_user() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let block = run_create::<BlockedUserResource>(&db, None, permanent_block(user.id))
        .await
        .unwrap();
    let blocked = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(blocked.status, UserStatus::Blocked);

    run_delete::<BlockedUserResource>(&db, None, block.id).await.unwrap();

    let restored = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(restored.status, UserStatus::Active);
}

#[tokio::test]
async fn test_block_status_changes_follow_user() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let block = run_create::<BlockedUserResource>(&db, None, permanent_block(user.id))
        .await
        .unwrap();

    let lifted = run_update::<BlockedUserResource>(
        &db,
        None,
        block.id,
        UpdateBlockedUser {
            status: Some("lifted".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(lifted.status, BlockStatus::Lifted);
    let current = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(current.status, UserStatus::Active);

    run_update::<BlockedUserResource>(
        &db,
        None,
        block.id,
        UpdateBlockedUser {
            status: Some("active".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let current = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(current.status, UserStatus::Blocked);
    assert!(BlockedUser::is_user_blocked(&db, user.id).await.unwrap());
}

#[tokio::test]
async fn test_overdue_temporary_block_expires_on_check() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let block = run_create::<BlockedUserResource>(
        &db,
        None,
        CreateBlockedUser {
            block_type: Some("temporary".to_string()),
            blocked_until: Some(Utc::now() - Duration::hours(1)),
            ..permanent_block(user.id)
        },
    )
    .await
    .unwrap();
    let blocked = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(blocked.status, UserStatus::Blocked);

    assert!(!BlockedUser::is_user_blocked(&db, user.id).await.unwrap());

    let expired = run_get::<BlockedUserResource>(&db, block.id).await.unwrap();
    assert_eq!(expired.status, BlockStatus::Expired);
    let restored = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(restored.status, UserStatus::Active);
}

#[tokio::test]
async fn test_bulk_delete_counts_only_existing_rows() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let first = create_task(&db, user.id, "Stretch").await;
    let second = create_task(&db, user.id, "Hydrate").await;

    let deleted = run_bulk_delete::<TaskResource>(&db, None, &[first.id, Uuid::new_v4(), second.id])
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let filters = TaskFilters {
        user_id: Some(user.id),
        ..Default::default()
    };
    assert_eq!(run_count::<TaskResource>(&db, &filters, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stats_count_new_rows() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let before = run_stats::<TaskResource>(&db, Some(7)).await.unwrap();
    create_task(&db, user.id, "Call sponsor").await;
    let after = run_stats::<TaskResource>(&db, Some(7)).await.unwrap();

    assert_eq!(after.days, 7);
    assert!(after.total > before.total);
    assert!(after.recent > before.recent);
    assert!(after.recent <= after.total);

    let growth: f64 = after.growth.parse().unwrap();
    assert!(growth > 0.0 && growth <= 100.0);
    assert_eq!(after.growth.split('.').nth(1).map(str::len), Some(2));
}

#[tokio::test]
async fn test_update_missing_id_writes_nothing() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    create_task(&db, user.id, "Journal").await;
    let filters = TaskFilters {
        user_id: Some(user.id),
        ..Default::default()
    };

    let err = run_update::<TaskResource>(
        &db,
        None,
        Uuid::new_v4(),
        UpdateTask {
            title: Some("Renamed".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let page = run_list::<TaskResource>(&db, &ListOptions::new(Some(1), Some(10)), &filters)
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.data[0].title, "Journal");
}

#[tokio::test]
async fn test_delete_then_get() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let task = create_task(&db, user.id, "Walk").await;

    run_delete::<TaskResource>(&db, None, task.id).await.unwrap();
    let err = run_get::<TaskResource>(&db, task.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    run_delete::<UserResource>(&db, None, user.id).await.unwrap();
    let inactive = run_get::<UserResource>(&db, user.id).await.unwrap();
    assert_eq!(inactive.status, UserStatus::Inactive);
}

/// Provider whose error text is too long to store in a delivery report
struct VerboseFailure;

#[async_trait]
impl DeliveryProvider for VerboseFailure {
    fn name(&self) -> &str {
        "verbose-failure"
    }

    async fn deliver(&self, _request: &DeliveryRequest) -> Result<DeliveryReport, DeliveryError> {
        Err(DeliveryError::Rejected("x".repeat(3000)))
    }
}

#[tokio::test]
async fn test_send_marks_failed_when_report_cannot_be_written() {
    let Some(db) = test_pool().await else { return };

    let user = create_user(&db).await;
    let notification = run_create::<NotificationResource>(
        &db,
        None,
        CreateNotification {
            title: "Check in".to_string(),
            body: "How are you today?".to_string(),
            audience: Some("user".to_string()),
            target_user_id: Some(user.id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(notification.status, NotificationStatus::Draft);

    let err = Notification::send(&db, &VerboseFailure, None, notification.id)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let failed = run_get::<NotificationResource>(&db, notification.id).await.unwrap();
    assert_eq!(failed.status, NotificationStatus::Failed);
}
