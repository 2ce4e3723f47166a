//! Course feedback from enrolled students.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::Feedback;

use crate::access::{self, Actor};
use crate::courses::CourseService;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedbackView {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub course_id: Uuid,
    pub course_name: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitFeedbackParams {
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFeedbackParams {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

pub struct FeedbackService;

impl FeedbackService {
    pub fn validate_rating(rating: i32) -> Result<(), AppError> {
        if (MIN_RATING..=MAX_RATING).contains(&rating) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Rating must be between {} and {}",
                MIN_RATING, MAX_RATING
            )))
        }
    }

    /// Leave feedback on a course the calling student is enrolled in.
    pub async fn submit(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
        params: &SubmitFeedbackParams,
    ) -> Result<Feedback, AppError> {
        actor.require_student("leave feedback")?;
        Self::validate_rating(params.rating)?;
        let course = CourseService::get(pool, course_id).await?;
        if !access::is_enrolled(pool, actor.user_id, course.id).await? {
            return Err(AppError::Forbidden(
                "You can only leave feedback for courses you are enrolled in".to_string(),
            ));
        }

        let feedback: Feedback = sqlx::query_as(
            r#"
            INSERT INTO feedback (student_id, course_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(actor.user_id)
        .bind(course.id)
        .bind(params.rating)
        .bind(params.comment.trim())
        .fetch_one(pool)
        .await?;

        tracing::info!(feedback_id = %feedback.id, course_id = %course.id, rating = feedback.rating, "Feedback submitted");
        Ok(feedback)
    }

    async fn owned(pool: &PgPool, actor: &Actor, feedback_id: Uuid) -> Result<Feedback, AppError> {
        let feedback: Feedback = sqlx::query_as("SELECT * FROM feedback WHERE id = $1")
            .bind(feedback_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Feedback {} not found", feedback_id)))?;

        if feedback.student_id != actor.user_id {
            return Err(AppError::Forbidden(
                "You can only change your own feedback".to_string(),
            ));
        }
        Ok(feedback)
    }

    pub async fn update(
        pool: &PgPool,
        actor: &Actor,
        feedback_id: Uuid,
        params: &UpdateFeedbackParams,
    ) -> Result<Feedback, AppError> {
        let existing = Self::owned(pool, actor, feedback_id).await?;
        let rating = params.rating.unwrap_or(existing.rating);
        Self::validate_rating(rating)?;
        let comment = params
            .comment
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.comment);

        let feedback = sqlx::query_as(
            "UPDATE feedback SET rating = $1, comment = $2 WHERE id = $3 RETURNING *",
        )
        .bind(rating)
        .bind(comment)
        .bind(feedback_id)
        .fetch_one(pool)
        .await?;
        Ok(feedback)
    }

    pub async fn delete(pool: &PgPool, actor: &Actor, feedback_id: Uuid) -> Result<(), AppError> {
        Self::owned(pool, actor, feedback_id).await?;
        sqlx::query("DELETE FROM feedback WHERE id = $1")
            .bind(feedback_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// All feedback on a course, newest first.
    pub async fn list_for_course(
        pool: &PgPool,
        course_id: Uuid,
    ) -> Result<Vec<FeedbackView>, AppError> {
        let course = CourseService::get(pool, course_id).await?;
        let feedback = sqlx::query_as(
            r#"
            SELECT f.id, f.student_id, (u.first_name || ' ' || u.last_name) AS student_name,
                   f.course_id, c.name AS course_name, f.rating, f.comment, f.created_at
            FROM feedback f
            JOIN users u ON u.id = f.student_id
            JOIN courses c ON c.id = f.course_id
            WHERE f.course_id = $1
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(course.id)
        .fetch_all(pool)
        .await?;
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(FeedbackService::validate_rating(1).is_ok());
        assert!(FeedbackService::validate_rating(5).is_ok());
        assert!(matches!(
            FeedbackService::validate_rating(0),
            Err(AppError::Validation(_))
        ));
        assert!(FeedbackService::validate_rating(6).is_err());
    }
}
