//! Status updates posted on user profiles.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::StatusUpdate;

use crate::access::Actor;

pub const MAX_STATUS_CHARS: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusParams {
    pub content: String,
}

pub struct StatusService;

impl StatusService {
    pub fn validate_content(content: &str) -> Result<String, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation(
                "Status update cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_STATUS_CHARS {
            return Err(AppError::Validation(format!(
                "Status update exceeds {} characters",
                MAX_STATUS_CHARS
            )));
        }
        Ok(content.to_string())
    }

    pub async fn post(pool: &PgPool, actor: &Actor, content: &str) -> Result<StatusUpdate, AppError> {
        let content = Self::validate_content(content)?;
        let update: StatusUpdate = sqlx::query_as(
            "INSERT INTO status_updates (user_id, content) VALUES ($1, $2) RETURNING *",
        )
        .bind(actor.user_id)
        .bind(&content)
        .fetch_one(pool)
        .await?;

        tracing::debug!(status_id = %update.id, user_id = %actor.user_id, "Status update posted");
        Ok(update)
    }

    async fn owned(pool: &PgPool, actor: &Actor, status_id: Uuid) -> Result<StatusUpdate, AppError> {
        let update: StatusUpdate = sqlx::query_as("SELECT * FROM status_updates WHERE id = $1")
            .bind(status_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Status update {} not found", status_id)))?;

        if update.user_id != actor.user_id {
            return Err(AppError::Forbidden(
                "You can only change your own status updates".to_string(),
            ));
        }
        Ok(update)
    }

    pub async fn edit(
        pool: &PgPool,
        actor: &Actor,
        status_id: Uuid,
        content: &str,
    ) -> Result<StatusUpdate, AppError> {
        Self::owned(pool, actor, status_id).await?;
        let content = Self::validate_content(content)?;
        let update = sqlx::query_as("UPDATE status_updates SET content = $1 WHERE id = $2 RETURNING *")
            .bind(&content)
            .bind(status_id)
            .fetch_one(pool)
            .await?;
        Ok(update)
    }

    pub async fn delete(pool: &PgPool, actor: &Actor, status_id: Uuid) -> Result<(), AppError> {
        Self::owned(pool, actor, status_id).await?;
        sqlx::query("DELETE FROM status_updates WHERE id = $1")
            .bind(status_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// A user's status updates, newest first.
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<StatusUpdate>, AppError> {
        let updates = sqlx::query_as(
            "SELECT * FROM status_updates WHERE user_id = $1 ORDER BY timestamp DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(updates)
    }
}
