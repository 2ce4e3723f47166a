//! Enrollment service.
//!
//! Enrollment is the only record of course membership. Each mutation here
//! also keeps the course discussion room and the notification tables in step,
//! inside the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{BlockNotification, Course, Enrollment, EnrollmentNotification};

use crate::access::Actor;
use crate::chat::ChatRoomService;
use crate::courses::CourseService;
use crate::fanout::NotificationFanout;

/// Enrollment joined with student and course details.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrollmentView {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_username: String,
    pub student_name: String,
    pub course_id: Uuid,
    pub course_code: String,
    pub course_name: String,
    pub created_at: DateTime<Utc>,
}

/// A new enrollment together with the notification it produced.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentOutcome {
    pub enrollment: Enrollment,
    pub notification: EnrollmentNotification,
}

const VIEW_SELECT: &str = r#"
    SELECT e.id, e.student_id, u.username AS student_username,
           (u.first_name || ' ' || u.last_name) AS student_name,
           e.course_id, c.code AS course_code, c.name AS course_name, e.created_at
    FROM enrollments e
    JOIN users u ON u.id = e.student_id
    JOIN courses c ON c.id = e.course_id
"#;

pub struct EnrollmentService;

impl EnrollmentService {
    pub async fn is_blocked(
        conn: &mut PgConnection,
        course_id: Uuid,
        student_id: Uuid,
    ) -> Result<bool, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM course_blocked_students WHERE course_id = $1 AND user_id = $2",
        )
        .bind(course_id)
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.is_some())
    }

    /// Check everything that must hold before a student may enroll.
    fn check_enrollable(course: &Course, blocked: bool) -> Result<(), AppError> {
        if blocked {
            return Err(AppError::Forbidden(
                "You have been blocked from this course".to_string(),
            ));
        }
        if !course.is_open() {
            return Err(AppError::Validation(format!(
                "Enrollment for {} is closed",
                course.code
            )));
        }
        Ok(())
    }

    /// Enroll the calling student, notify the teacher and join the discussion room.
    pub async fn enroll(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
    ) -> Result<EnrollmentOutcome, AppError> {
        actor.require_student("enroll in courses")?;

        // The course row lock serializes this against block and close.
        let mut tx = pool.begin().await?;
        let course = CourseService::lock(&mut tx, course_id).await?;
        let blocked = Self::is_blocked(&mut tx, course_id, actor.user_id).await?;
        Self::check_enrollable(&course, blocked)?;

        let enrollment: Enrollment = sqlx::query_as(
            r#"
            INSERT INTO enrollments (student_id, course_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(actor.user_id)
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_constraint(e, format!("You are already enrolled in {}", course.code))
        })?;

        let notification =
            NotificationFanout::on_enrollment_created(&mut tx, &enrollment, &course).await?;
        ChatRoomService::add_course_member(&mut tx, course_id, actor.user_id).await?;
        tx.commit().await?;

        tracing::info!(
            enrollment_id = %enrollment.id,
            student_id = %actor.user_id,
            course_id = %course_id,
            "Student enrolled"
        );

        Ok(EnrollmentOutcome {
            enrollment,
            notification,
        })
    }

    /// Drop the calling student's enrollment and leave the discussion room.
    pub async fn unenroll(pool: &PgPool, actor: &Actor, course_id: Uuid) -> Result<(), AppError> {
        actor.require_student("unenroll from courses")?;
        let course = CourseService::get(pool, course_id).await?;

        let mut tx = pool.begin().await?;
        let result = sqlx::query("DELETE FROM enrollments WHERE student_id = $1 AND course_id = $2")
            .bind(actor.user_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "You are not enrolled in {}",
                course.code
            )));
        }

        ChatRoomService::remove_course_member(&mut tx, course_id, actor.user_id).await?;
        tx.commit().await?;

        tracing::info!(student_id = %actor.user_id, course_id = %course_id, "Student unenrolled");
        Ok(())
    }

    /// Remove a student from the course and keep them out.
    pub async fn block(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
        student_id: Uuid,
    ) -> Result<BlockNotification, AppError> {
        let course = CourseService::get(pool, course_id).await?;
        actor.require_course_teacher(&course, "block students")?;
        if student_id == course.teacher_id {
            return Err(AppError::Validation(
                "The course teacher cannot be blocked".to_string(),
            ));
        }
        let target = Actor::load(pool, student_id).await.map_err(|e| match e {
            AppError::Auth(_) => AppError::NotFound(format!("User {} not found", student_id)),
            other => other,
        })?;
        if !target.is_student() {
            return Err(AppError::Validation(format!(
                "{} is not a student",
                target.username
            )));
        }

        let mut tx = pool.begin().await?;
        let course = CourseService::lock(&mut tx, course_id).await?;
        sqlx::query("DELETE FROM enrollments WHERE student_id = $1 AND course_id = $2")
            .bind(student_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        ChatRoomService::remove_course_member(&mut tx, course_id, student_id).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO course_blocked_students (course_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(course_id)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "{} is already blocked from {}",
                target.username, course.code
            )));
        }

        let notification = NotificationFanout::on_student_blocked(&mut tx, &course, student_id).await?;
        tx.commit().await?;

        tracing::info!(
            student_id = %student_id,
            course_id = %course_id,
            teacher_id = %actor.user_id,
            "Student blocked"
        );

        Ok(notification)
    }

    /// Lift a block. The student must enroll again to rejoin.
    pub async fn unblock(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
        student_id: Uuid,
    ) -> Result<(), AppError> {
        let course = CourseService::get(pool, course_id).await?;
        actor.require_course_teacher(&course, "unblock students")?;

        let result =
            sqlx::query("DELETE FROM course_blocked_students WHERE course_id = $1 AND user_id = $2")
                .bind(course_id)
                .bind(student_id)
                .execute(pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "Student is not blocked from this course".to_string(),
            ));
        }

        tracing::info!(student_id = %student_id, course_id = %course_id, "Student unblocked");
        Ok(())
    }

    /// Enrollments of the calling student, newest first.
    pub async fn list_for_student(
        pool: &PgPool,
        actor: &Actor,
    ) -> Result<Vec<EnrollmentView>, AppError> {
        actor.require_student("list enrollments")?;
        let enrollments = sqlx::query_as(&format!(
            "{} WHERE e.student_id = $1 ORDER BY e.created_at DESC",
            VIEW_SELECT
        ))
        .bind(actor.user_id)
        .fetch_all(pool)
        .await?;
        Ok(enrollments)
    }

    /// Enrollments of one course, visible to its teacher.
    pub async fn list_for_course(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
    ) -> Result<Vec<EnrollmentView>, AppError> {
        let course = CourseService::get(pool, course_id).await?;
        actor.require_course_teacher(&course, "view enrollments")?;

        let enrollments = sqlx::query_as(&format!(
            "{} WHERE e.course_id = $1 ORDER BY e.created_at",
            VIEW_SELECT
        ))
        .bind(course_id)
        .fetch_all(pool)
        .await?;
        Ok(enrollments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use elearn_common::types::EnrollmentStatus;

    fn course(status: EnrollmentStatus) -> Course {
        Course {
            id: Uuid::new_v4(),
            code: "CM303".to_string(),
            name: "Databases".to_string(),
            description: String::new(),
            teacher_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            enrollment_status: status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_course_is_enrollable() {
        assert!(EnrollmentService::check_enrollable(&course(EnrollmentStatus::Open), false).is_ok());
    }

    #[test]
    fn test_closed_course_rejected() {
        let result = EnrollmentService::check_enrollable(&course(EnrollmentStatus::Closed), false);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blocked_student_forbidden_even_when_closed() {
        let result = EnrollmentService::check_enrollable(&course(EnrollmentStatus::Closed), true);
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
