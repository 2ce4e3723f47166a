//! Role and membership rules shared by every service.
//!
//! Handlers resolve the caller into an [`Actor`] once per request; services
//! then ask it whether the caller may act as a teacher, a student, or the
//! owner of a given course.

use sqlx::PgPool;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{Course, UserType};

/// The authenticated caller, with its role resolved.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Actor {
    pub user_id: Uuid,
    pub username: String,
    pub user_type: Option<UserType>,
    pub is_staff: bool,
}

impl Actor {
    /// Load the caller's role. A token for a deleted account is an auth failure.
    pub async fn load(pool: &PgPool, user_id: Uuid) -> Result<Self, AppError> {
        sqlx::query_as(
            r#"
            SELECT u.id AS user_id, u.username, e.user_type, u.is_staff
            FROM users u
            LEFT JOIN elearn_users e ON e.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::Auth("Account no longer exists".to_string()))
    }

    pub fn is_teacher(&self) -> bool {
        self.user_type == Some(UserType::Teacher)
    }

    pub fn is_student(&self) -> bool {
        self.user_type == Some(UserType::Student)
    }

    pub fn require_teacher(&self, action: &str) -> Result<(), AppError> {
        if self.is_teacher() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("Only teachers can {}", action)))
        }
    }

    pub fn require_student(&self, action: &str) -> Result<(), AppError> {
        if self.is_student() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("Only students can {}", action)))
        }
    }

    /// True when the caller teaches `course`.
    pub fn teaches(&self, course: &Course) -> bool {
        self.is_teacher() && course.teacher_id == self.user_id
    }

    pub fn require_course_teacher(&self, course: &Course, action: &str) -> Result<(), AppError> {
        if self.teaches(course) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "You are not authorized to {} for this course",
                action
            )))
        }
    }
}

/// Whether `student_id` currently holds an enrollment in `course_id`.
pub async fn is_enrolled(pool: &PgPool, student_id: Uuid, course_id: Uuid) -> Result<bool, AppError> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM enrollments WHERE student_id = $1 AND course_id = $2")
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Enrolled students and the course teacher count as course participants.
pub async fn is_participant(pool: &PgPool, actor: &Actor, course: &Course) -> Result<bool, AppError> {
    if actor.teaches(course) {
        return Ok(true);
    }
    is_enrolled(pool, actor.user_id, course.id).await
}
