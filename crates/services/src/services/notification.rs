//! In-app notifications and the background sweeps that generate and expire them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use db::{
    DBService,
    models::{
        notification::{CreateNotification, Notification, NotificationKind},
        project::Project,
        project_member::MemberRole,
        task::Task,
    },
};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Intervals and windows of the background sweeps.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub sweep_interval: Duration,
    pub cleanup_interval: Duration,
    /// Tasks due within this window get a due-soon reminder
    pub due_soon_window: chrono::Duration,
    /// Read notifications older than this are deleted
    pub retention: chrono::Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(3600),
            due_soon_window: chrono::Duration::hours(24),
            retention: chrono::Duration::days(30),
        }
    }
}

#[derive(Clone)]
pub struct NotificationService {
    db: DBService,
}

impl NotificationService {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }

    /// Tell the assignee about a task someone else handed them.
    pub async fn notify_task_assigned(
        &self,
        task: &Task,
        assigned_by: Uuid,
    ) -> Result<Option<Notification>, NotificationError> {
        let Some(assignee) = task.assignee_id.filter(|id| *id != assigned_by) else {
            return Ok(None);
        };
        let notification = Notification::create(
            &self.db.pool,
            &CreateNotification {
                user_id: assignee,
                kind: NotificationKind::TaskAssigned,
                title: "New task assigned".to_string(),
                message: format!("You were assigned '{}'", task.title),
                entity_id: Some(task.id),
            },
        )
        .await?;
        debug!(task_id = %task.id, user_id = %assignee, "Sent assignment notification");
        Ok(Some(notification))
    }

    pub async fn notify_project_invite(
        &self,
        project: &Project,
        user_id: Uuid,
        role: MemberRole,
        invited_by: Uuid,
    ) -> Result<Option<Notification>, NotificationError> {
        if user_id == invited_by {
            return Ok(None);
        }
        let notification = Notification::create(
            &self.db.pool,
            &CreateNotification {
                user_id,
                kind: NotificationKind::ProjectInvite,
                title: "Added to project".to_string(),
                message: format!("You were added to '{}' as {role}", project.name),
                entity_id: Some(project.id),
            },
        )
        .await?;
        Ok(Some(notification))
    }

    /// Remind about unfinished tasks due in `(now, now + window]`, once per window.
    pub async fn run_due_soon_sweep(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<usize, NotificationError> {
        let tasks = Task::find_due_between(&self.db.pool, now, now + window).await?;
        let mut sent = 0;
        for task in tasks {
            let Some(due) = task.due_date else { continue };
            let message = format!(
                "'{}' is due {}",
                task.title,
                due.format("%Y-%m-%d %H:%M UTC")
            );
            if self
                .send_once(&task, NotificationKind::TaskDueSoon, "Task due soon", message, now - window)
                .await?
            {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Flag unfinished tasks past their due date, at most once a day per task.
    pub async fn run_overdue_sweep(&self, now: DateTime<Utc>) -> Result<usize, NotificationError> {
        let tasks = Task::find_overdue(&self.db.pool, now).await?;
        let mut sent = 0;
        for task in tasks {
            let message = format!("'{}' is past its due date", task.title);
            if self
                .send_once(
                    &task,
                    NotificationKind::TaskOverdue,
                    "Task overdue",
                    message,
                    now - chrono::Duration::hours(24),
                )
                .await?
            {
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub async fn run_cleanup(
        &self,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Result<u64, NotificationError> {
        Ok(Notification::delete_read_older_than(&self.db.pool, now - retention).await?)
    }

    async fn send_once(
        &self,
        task: &Task,
        kind: NotificationKind,
        title: &str,
        message: String,
        since: DateTime<Utc>,
    ) -> Result<bool, NotificationError> {
        // Unassigned tasks remind their creator
        let user_id = task.assignee_id.unwrap_or(task.created_by);
        if Notification::exists_since(&self.db.pool, user_id, kind, task.id, since).await? {
            return Ok(false);
        }
        Notification::create(
            &self.db.pool,
            &CreateNotification {
                user_id,
                kind,
                title: title.to_string(),
                message,
                entity_id: Some(task.id),
            },
        )
        .await?;
        Ok(true)
    }
}

/// Handles of the running sweep loops.
pub struct SweepHandles {
    pub reminders: JoinHandle<()>,
    pub cleanup: JoinHandle<()>,
}

impl SweepHandles {
    pub fn abort(&self) {
        self.reminders.abort();
        self.cleanup.abort();
    }
}

/// Background loops: due-soon and overdue reminders, plus cleanup of old read notifications.
pub struct NotificationSweeper {
    service: NotificationService,
    config: SweepConfig,
}

impl NotificationSweeper {
    pub fn spawn(service: NotificationService, config: SweepConfig) -> SweepHandles {
        let sweeper = std::sync::Arc::new(Self { service, config });

        let reminders = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.reminder_loop().await })
        };
        let cleanup = tokio::spawn(async move { sweeper.cleanup_loop().await });

        SweepHandles { reminders, cleanup }
    }

    async fn reminder_loop(&self) {
        info!(
            "Starting notification sweep with interval {:?}, due-soon window {}h",
            self.config.sweep_interval,
            self.config.due_soon_window.num_hours()
        );
        let mut ticker = interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = Utc::now();
            match self
                .service
                .run_due_soon_sweep(now, self.config.due_soon_window)
                .await
            {
                Ok(0) => {}
                Ok(sent) => info!(sent, "Sent due-soon reminders"),
                Err(e) => error!("Error running due-soon sweep: {}", e),
            }
            match self.service.run_overdue_sweep(now).await {
                Ok(0) => {}
                Ok(sent) => info!(sent, "Sent overdue reminders"),
                Err(e) => error!("Error running overdue sweep: {}", e),
            }
        }
    }

    async fn cleanup_loop(&self) {
        info!(
            "Starting notification cleanup with interval {:?}, retention {} days",
            self.config.cleanup_interval,
            self.config.retention.num_days()
        );
        let mut ticker = interval(self.config.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.service.run_cleanup(Utc::now(), self.config.retention).await {
                Ok(0) => debug!("Notification cleanup: nothing to delete"),
                Ok(deleted) => info!(deleted, "Deleted old read notifications"),
                Err(e) => error!("Error cleaning up notifications: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use db::models::{
        notification::NotificationQuery,
        project::CreateProject,
        task::{CreateTask, TaskStatus},
        user::{CreateUser, User},
    };

    use super::*;

    struct Fixture {
        db: DBService,
        service: NotificationService,
        owner: Uuid,
        helper: Uuid,
        project: Project,
    }

    async fn user(db: &DBService, name: &str) -> Uuid {
        User::create(
            &db.pool,
            &CreateUser {
                email: format!("{name}@example.com"),
                username: name.to_string(),
                full_name: None,
                password_hash: "x".to_string(),
                role_id: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap()
        .id
    }

    async fn fixture() -> Fixture {
        let db = DBService::new_in_memory().await.unwrap();
        let owner = user(&db, "owner").await;
        let helper = user(&db, "helper").await;
        let project = Project::create(
            &db.pool,
            &CreateProject {
                name: "Release".to_string(),
                description: None,
                status: None,
                priority: None,
                parent_id: None,
                start_date: None,
                end_date: None,
                color: None,
            },
            owner,
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        Fixture {
            service: NotificationService::new(db.clone()),
            db,
            owner,
            helper,
            project,
        }
    }

    impl Fixture {
        async fn task(&self, title: &str, assignee_id: Option<Uuid>, due_date: Option<DateTime<Utc>>) -> Task {
            Task::create(
                &self.db.pool,
                &CreateTask {
                    project_id: self.project.id,
                    title: title.to_string(),
                    description: None,
                    status: None,
                    priority: None,
                    assignee_id,
                    start_date: None,
                    due_date,
                    estimated_hours: None,
                    position: None,
                },
                self.owner,
                Uuid::new_v4(),
            )
            .await
            .unwrap()
        }

        async fn inbox(&self, user_id: Uuid) -> Vec<Notification> {
            Notification::find_by_user(&self.db.pool, user_id, &NotificationQuery::default())
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn due_soon_reminders_are_deduplicated() {
        let fx = fixture().await;
        let now = Utc::now();
        fx.task("assigned", Some(fx.helper), Some(now + Duration::hours(2))).await;
        fx.task("unassigned", None, Some(now + Duration::hours(3))).await;
        fx.task("later", Some(fx.helper), Some(now + Duration::hours(48))).await;
        let done = fx.task("done", Some(fx.helper), Some(now + Duration::hours(1))).await;
        Task::update_status(&fx.db.pool, done.id, TaskStatus::Done, None)
            .await
            .unwrap();

        let window = Duration::hours(24);
        assert_eq!(fx.service.run_due_soon_sweep(now, window).await.unwrap(), 2);
        assert_eq!(fx.service.run_due_soon_sweep(now, window).await.unwrap(), 0);

        let helper_inbox = fx.inbox(fx.helper).await;
        assert_eq!(helper_inbox.len(), 1);
        assert_eq!(helper_inbox[0].kind, NotificationKind::TaskDueSoon);
        assert!(helper_inbox[0].message.contains("assigned"));
        // Creator gets the unassigned one
        assert_eq!(fx.inbox(fx.owner).await.len(), 1);
    }

    #[tokio::test]
    async fn overdue_reminders_repeat_daily() {
        let fx = fixture().await;
        let now = Utc::now();
        let task = fx.task("late", Some(fx.helper), Some(now - Duration::hours(1))).await;

        assert_eq!(fx.service.run_overdue_sweep(now).await.unwrap(), 1);
        assert_eq!(fx.service.run_overdue_sweep(now).await.unwrap(), 0);
        assert_eq!(
            fx.service
                .run_overdue_sweep(now + Duration::hours(25))
                .await
                .unwrap(),
            1
        );

        let inbox = fx.inbox(fx.helper).await;
        assert_eq!(inbox.len(), 2);
        assert!(inbox.iter().all(|n| n.entity_id == Some(task.id)));
    }

    #[tokio::test]
    async fn assignment_and_invite_skip_self() {
        let fx = fixture().await;
        let own = fx.task("mine", Some(fx.owner), None).await;
        assert!(fx.service.notify_task_assigned(&own, fx.owner).await.unwrap().is_none());

        let handed = fx.task("yours", Some(fx.helper), None).await;
        let sent = fx
            .service
            .notify_task_assigned(&handed, fx.owner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.user_id, fx.helper);
        assert_eq!(sent.kind, NotificationKind::TaskAssigned);

        let invite = fx
            .service
            .notify_project_invite(&fx.project, fx.helper, MemberRole::Observer, fx.owner)
            .await
            .unwrap()
            .unwrap();
        assert!(invite.message.contains("observer"));
        assert!(
            fx.service
                .notify_project_invite(&fx.project, fx.owner, MemberRole::Admin, fx.owner)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn cleanup_only_removes_old_read_notifications() {
        let fx = fixture().await;
        let task = fx.task("yours", Some(fx.helper), None).await;
        let read = fx
            .service
            .notify_task_assigned(&task, fx.owner)
            .await
            .unwrap()
            .unwrap();
        fx.service.notify_task_assigned(&task, fx.owner).await.unwrap();
        Notification::mark_read(&fx.db.pool, fx.helper, read.id)
            .await
            .unwrap();

        let retention = Duration::days(30);
        assert_eq!(fx.service.run_cleanup(Utc::now(), retention).await.unwrap(), 0);
        assert_eq!(
            fx.service
                .run_cleanup(Utc::now() + Duration::days(31), retention)
                .await
                .unwrap(),
            1
        );
        let remaining = fx.inbox(fx.helper).await;
        assert_eq!(remaining.len(), 1);
        assert!(!remaining[0].is_read);
    }

    #[tokio::test]
    async fn sweeper_loops_can_be_aborted() {
        let fx = fixture().await;
        let handles = NotificationSweeper::spawn(fx.service.clone(), SweepConfig::default());
        handles.abort();
        assert!(handles.reminders.await.unwrap_err().is_cancelled());
    }
}
