//! Notification inbox.
//!
//! Students receive enrollment, material and block notifications. Teachers
//! receive the enrollment notifications of the courses they teach.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::NotificationKind;

use crate::access::Actor;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrollmentNotificationView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_name: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub teacher_id: Uuid,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MaterialNotificationView {
    pub id: Uuid,
    pub material_id: Uuid,
    pub material_name: String,
    pub course_id: Uuid,
    pub course_name: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockNotificationView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_name: String,
    pub message: String,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

/// Notifications addressed to one user, grouped by kind, newest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inbox {
    pub enrollment: Vec<EnrollmentNotificationView>,
    pub material: Vec<MaterialNotificationView>,
    pub block: Vec<BlockNotificationView>,
    pub unread_count: usize,
}

impl Inbox {
    fn count_unread(&mut self) {
        self.unread_count = self.enrollment.iter().filter(|n| !n.read).count()
            + self.material.iter().filter(|n| !n.read).count()
            + self.block.iter().filter(|n| !n.read).count();
    }
}

/// Condition selecting rows addressed to `$1` in a notification table.
fn recipient_clause(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Enrollment => "(student_id = $1 OR teacher_id = $1)",
        NotificationKind::Material | NotificationKind::Block => "student_id = $1",
    }
}

pub struct NotificationService;

impl NotificationService {
    pub async fn inbox(pool: &PgPool, actor: &Actor, unread_only: bool) -> Result<Inbox, AppError> {
        let mut inbox = Inbox {
            enrollment: sqlx::query_as(
                r#"
                SELECT n.id, n.course_id, c.name AS course_name, n.student_id,
                       (u.first_name || ' ' || u.last_name) AS student_name,
                       n.teacher_id, n.read, n.created_at
                FROM enrollment_notifications n
                JOIN courses c ON c.id = n.course_id
                JOIN users u ON u.id = n.student_id
                WHERE (n.student_id = $1 OR n.teacher_id = $1)
                  AND (NOT $2 OR NOT n.read)
                ORDER BY n.created_at DESC
                "#,
            )
            .bind(actor.user_id)
            .bind(unread_only)
            .fetch_all(pool)
            .await?,
            ..Inbox::default()
        };

        if !actor.is_teacher() {
            inbox.material = sqlx::query_as(
                r#"
                SELECT n.id, n.material_id, m.name AS material_name, m.course_id,
                       c.name AS course_name, n.read, n.created_at
                FROM material_notifications n
                JOIN materials m ON m.id = n.material_id
                JOIN courses c ON c.id = m.course_id
                WHERE n.student_id = $1
                  AND (NOT $2 OR NOT n.read)
                ORDER BY n.created_at DESC
                "#,
            )
            .bind(actor.user_id)
            .bind(unread_only)
            .fetch_all(pool)
            .await?;

            inbox.block = sqlx::query_as(
                r#"
                SELECT n.id, n.course_id, c.name AS course_name, n.message, n.read, n.timestamp
                FROM block_notifications n
                JOIN courses c ON c.id = n.course_id
                WHERE n.student_id = $1
                  AND (NOT $2 OR NOT n.read)
                ORDER BY n.timestamp DESC
                "#,
            )
            .bind(actor.user_id)
            .bind(unread_only)
            .fetch_all(pool)
            .await?;
        }

        inbox.count_unread();
        Ok(inbox)
    }

    /// Mark one notification read. Someone else's notification reads as missing.
    pub async fn mark_read(
        pool: &PgPool,
        actor: &Actor,
        kind: &str,
        notification_id: Uuid,
    ) -> Result<(), AppError> {
        let kind: NotificationKind = kind.parse().map_err(AppError::Validation)?;

        let result = sqlx::query(&format!(
            "UPDATE {} SET read = TRUE WHERE id = $2 AND {}",
            kind.table(),
            recipient_clause(kind)
        ))
        .bind(actor.user_id)
        .bind(notification_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Notification {} not found",
                notification_id
            )));
        }

        tracing::debug!(kind = %kind, notification_id = %notification_id, "Notification marked read");
        Ok(())
    }

    /// Mark everything addressed to the caller as read; returns how many changed.
    pub async fn mark_all_read(pool: &PgPool, actor: &Actor) -> Result<u64, AppError> {
        let mut tx = pool.begin().await?;
        let mut updated = 0;
        for kind in [
            NotificationKind::Enrollment,
            NotificationKind::Material,
            NotificationKind::Block,
        ] {
            let result = sqlx::query(&format!(
                "UPDATE {} SET read = TRUE WHERE NOT read AND {}",
                kind.table(),
                recipient_clause(kind)
            ))
            .bind(actor.user_id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;

        tracing::debug!(user_id = %actor.user_id, updated, "Notifications marked read");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teacher_reaches_enrollment_notifications() {
        assert!(recipient_clause(NotificationKind::Enrollment).contains("teacher_id"));
        assert!(!recipient_clause(NotificationKind::Material).contains("teacher_id"));
        assert!(!recipient_clause(NotificationKind::Block).contains("teacher_id"));
    }

    #[test]
    fn test_unread_count() {
        let mut inbox = Inbox {
            block: vec![
                BlockNotificationView {
                    id: Uuid::new_v4(),
                    course_id: Uuid::new_v4(),
                    course_name: "Databases".to_string(),
                    message: "You have been blocked from the course: Databases".to_string(),
                    read: false,
                    timestamp: Utc::now(),
                },
                BlockNotificationView {
                    id: Uuid::new_v4(),
                    course_id: Uuid::new_v4(),
                    course_name: "Networks".to_string(),
                    message: "You have been blocked from the course: Networks".to_string(),
                    read: true,
                    timestamp: Utc::now(),
                },
            ],
            ..Inbox::default()
        };
        inbox.count_unread();
        assert_eq!(inbox.unread_count, 1);
    }
}
