//! Notification fan-out.
//!
//! Derived notification rows are written on the same connection (and thus the
//! same transaction) as the mutation that triggers them:
//! 1. Enrollment created → exactly one `EnrollmentNotification`
//! 2. Material created → one `MaterialNotification` per currently enrolled student
//! 3. Student blocked → one `BlockNotification`
//!
//! Callers own the transaction. If any insert fails the whole mutation rolls
//! back, so a material can never exist with only part of its notifications.

use sqlx::PgConnection;

use elearn_common::error::AppError;
use elearn_common::types::{
    BlockNotification, Course, Enrollment, EnrollmentNotification, Material,
};

/// Stateless notification writer.
pub struct NotificationFanout;

impl NotificationFanout {
    /// Record the enrollment for both the student and the course teacher.
    pub async fn on_enrollment_created(
        conn: &mut PgConnection,
        enrollment: &Enrollment,
        course: &Course,
    ) -> Result<EnrollmentNotification, AppError> {
        let notification: EnrollmentNotification = sqlx::query_as(
            r#"
            INSERT INTO enrollment_notifications (enrollment_id, course_id, student_id, teacher_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(enrollment.id)
        .bind(course.id)
        .bind(enrollment.student_id)
        .bind(course.teacher_id)
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!(
            notification_id = %notification.id,
            enrollment_id = %enrollment.id,
            teacher_id = %course.teacher_id,
            "Enrollment notification created"
        );

        Ok(notification)
    }

    /// Notify every student enrolled in the material's course at this moment.
    ///
    /// Returns the number of notifications written. Students who enroll later
    /// do not receive notifications for earlier materials.
    pub async fn on_material_created(
        conn: &mut PgConnection,
        material: &Material,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO material_notifications (material_id, student_id)
            SELECT $1, e.student_id
            FROM enrollments e
            WHERE e.course_id = $2
            ON CONFLICT (material_id, student_id) DO NOTHING
            "#,
        )
        .bind(material.id)
        .bind(material.course_id)
        .execute(&mut *conn)
        .await?;

        let created = result.rows_affected();
        tracing::debug!(
            material_id = %material.id,
            course_id = %material.course_id,
            created,
            "Material notifications fanned out"
        );

        Ok(created)
    }

    /// Tell the student they were removed from the course.
    pub async fn on_student_blocked(
        conn: &mut PgConnection,
        course: &Course,
        student_id: uuid::Uuid,
    ) -> Result<BlockNotification, AppError> {
        let notification: BlockNotification = sqlx::query_as(
            r#"
            INSERT INTO block_notifications (student_id, course_id, message)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(student_id)
        .bind(course.id)
        .bind(Self::block_message(course))
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!(
            notification_id = %notification.id,
            student_id = %student_id,
            course_id = %course.id,
            "Block notification created"
        );

        Ok(notification)
    }

    /// Text shown to a blocked student.
    pub fn block_message(course: &Course) -> String {
        format!("You have been blocked from the course: {}", course.name)
    }
}
