//! Chat room service: rooms, membership, moderators and persisted messages.
//!
//! Live delivery lives in `elearn-realtime`; this module only decides who may
//! read or write a room and stores what was said. Course discussion rooms are
//! created with their course and their membership is maintained by the
//! enrollment service, so manual membership edits are refused for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{
    ChatEvent, ChatRoom, Course, Message, UserSummary, is_discussion_room_name,
};

use crate::access::Actor;

/// Longest accepted chat message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Longest accepted room name, in characters.
pub const MAX_ROOM_NAME_CHARS: usize = 256;

/// Room row plus who is in it.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRoomView {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub members: Vec<UserSummary>,
    pub moderators: Vec<Uuid>,
}

/// Entry in the room directory.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRoomListItem {
    pub id: Uuid,
    pub chat_name: String,
    pub admin_id: Uuid,
    pub admin_username: String,
    pub course_id: Option<Uuid>,
    pub member_count: i64,
}

/// Persisted message joined with its author's username.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageView {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageView {
    /// Frame broadcast to the room group for this message.
    pub fn to_event(&self, room_name: &str) -> ChatEvent {
        ChatEvent {
            message_id: self.id,
            room: room_name.to_string(),
            user_id: self.user_id,
            username: self.username.clone(),
            message: self.content.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Parameters for creating a room.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatRoomParams {
    pub chat_name: String,
    #[serde(default)]
    pub members: Vec<Uuid>,
}

/// Admin edits to a room.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChatRoomParams {
    pub chat_name: Option<String>,
    /// Full replacement member list. The admin is always kept.
    pub members: Option<Vec<Uuid>>,
}

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.chat_room_id, m.user_id, u.username, m.content, m.timestamp
    FROM messages m
    JOIN users u ON u.id = m.user_id
"#;

/// Service layer for chat rooms and messages.
pub struct ChatRoomService;

impl ChatRoomService {
    pub fn validate_room_name(name: &str) -> Result<String, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Chat room name is required".to_string()));
        }
        if name.chars().count() > MAX_ROOM_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "Chat room name must be at most {} characters",
                MAX_ROOM_NAME_CHARS
            )));
        }
        if is_discussion_room_name(name) {
            return Err(AppError::Validation(format!(
                "'{}' is reserved for a course discussion room",
                name
            )));
        }
        Ok(name.to_string())
    }

    pub fn validate_message(content: &str) -> Result<String, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("Message must not be empty".to_string()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::Validation(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        Ok(content.to_string())
    }

    // ------------------------------------------------------------
    // Course discussion rooms (called inside course/enrollment transactions)
    // ------------------------------------------------------------

    /// Create the discussion room for a new course; the teacher is admin and member.
    pub async fn create_course_room(
        conn: &mut PgConnection,
        course: &Course,
    ) -> Result<ChatRoom, AppError> {
        let name = course.discussion_room_name();
        let room: ChatRoom = sqlx::query_as(
            r#"
            INSERT INTO chat_rooms (chat_name, admin_id, course_id)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(course.teacher_id)
        .bind(course.id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::from_constraint(e, format!("Chat room '{}' already exists", name)))?;

        sqlx::query("INSERT INTO chat_room_members (room_id, user_id) VALUES ($1, $2)")
            .bind(room.id)
            .bind(course.teacher_id)
            .execute(&mut *conn)
            .await?;

        Ok(room)
    }

    /// Keep the discussion room name in step with the course code.
    pub async fn rename_course_room(
        conn: &mut PgConnection,
        course: &Course,
    ) -> Result<(), AppError> {
        let name = course.discussion_room_name();
        sqlx::query("UPDATE chat_rooms SET chat_name = $1 WHERE course_id = $2")
            .bind(&name)
            .bind(course.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                AppError::from_constraint(e, format!("Chat room '{}' already exists", name))
            })?;
        Ok(())
    }

    pub async fn add_course_member(
        conn: &mut PgConnection,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_room_members (room_id, user_id)
            SELECT id, $2 FROM chat_rooms WHERE course_id = $1
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(course_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn remove_course_member(
        conn: &mut PgConnection,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            DELETE FROM chat_room_members
            WHERE user_id = $2
              AND room_id IN (SELECT id FROM chat_rooms WHERE course_id = $1)
            "#,
        )
        .bind(course_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn course_room(pool: &PgPool, course_id: Uuid) -> Result<Option<ChatRoom>, AppError> {
        let room = sqlx::query_as("SELECT * FROM chat_rooms WHERE course_id = $1")
            .bind(course_id)
            .fetch_optional(pool)
            .await?;
        Ok(room)
    }

    // ------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------

    /// Create a room administered by the caller, who also becomes a member.
    pub async fn create(
        pool: &PgPool,
        actor: &Actor,
        params: &CreateChatRoomParams,
    ) -> Result<ChatRoomView, AppError> {
        let name = Self::validate_room_name(&params.chat_name)?;
        let mut tx = pool.begin().await?;

        let room: ChatRoom = sqlx::query_as(
            "INSERT INTO chat_rooms (chat_name, admin_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(&name)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_constraint(e, format!("Chat room '{}' already exists", name)))?;

        let mut members = params.members.clone();
        members.push(actor.user_id);
        Self::insert_members(&mut tx, room.id, &members).await?;
        tx.commit().await?;

        tracing::info!(room_id = %room.id, chat_name = %room.chat_name, admin_id = %actor.user_id, "Chat room created");
        Self::view(pool, &room.chat_name).await
    }

    async fn insert_members(
        conn: &mut PgConnection,
        room_id: Uuid,
        members: &[Uuid],
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_room_members (room_id, user_id)
            SELECT $1, m FROM UNNEST($2::uuid[]) AS m
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(members)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_constraint(e, "Duplicate chat room member"))?;
        Ok(())
    }

    /// Room directory.
    pub async fn list(pool: &PgPool) -> Result<Vec<ChatRoomListItem>, AppError> {
        let rooms = sqlx::query_as(
            r#"
            SELECT r.id, r.chat_name, r.admin_id, u.username AS admin_username, r.course_id,
                   (SELECT COUNT(*) FROM chat_room_members m WHERE m.room_id = r.id) AS member_count
            FROM chat_rooms r
            JOIN users u ON u.id = r.admin_id
            ORDER BY r.chat_name
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(rooms)
    }

    /// Rooms the user belongs to.
    pub async fn list_for_member(pool: &PgPool, user_id: Uuid) -> Result<Vec<ChatRoom>, AppError> {
        let rooms = sqlx::query_as(
            r#"
            SELECT r.*
            FROM chat_rooms r
            JOIN chat_room_members m ON m.room_id = r.id
            WHERE m.user_id = $1
            ORDER BY r.chat_name
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rooms)
    }

    pub async fn get_by_name(pool: &PgPool, chat_name: &str) -> Result<ChatRoom, AppError> {
        sqlx::query_as("SELECT * FROM chat_rooms WHERE chat_name = $1")
            .bind(chat_name)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Chat room '{}' not found", chat_name)))
    }

    pub async fn view(pool: &PgPool, chat_name: &str) -> Result<ChatRoomView, AppError> {
        let room = Self::get_by_name(pool, chat_name).await?;

        let members: Vec<UserSummary> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.profile_picture, eu.user_type
            FROM chat_room_members m
            JOIN users u ON u.id = m.user_id
            LEFT JOIN elearn_users eu ON eu.user_id = u.id
            WHERE m.room_id = $1
            ORDER BY u.username
            "#,
        )
        .bind(room.id)
        .fetch_all(pool)
        .await?;

        let moderators: Vec<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM chat_room_moderators WHERE room_id = $1")
                .bind(room.id)
                .fetch_all(pool)
                .await?;

        Ok(ChatRoomView {
            room,
            members,
            moderators: moderators.into_iter().map(|(id,)| id).collect(),
        })
    }

    fn require_admin(room: &ChatRoom, actor: &Actor, action: &str) -> Result<(), AppError> {
        if room.admin_id == actor.user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "You are not authorized to {} this chat room",
                action
            )))
        }
    }

    fn reject_course_room(room: &ChatRoom) -> Result<(), AppError> {
        if room.course_id.is_some() {
            return Err(AppError::Validation(
                "Course discussion rooms follow course enrollment and cannot be edited directly"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Rename a room and/or replace its member list. Admin only.
    pub async fn update(
        pool: &PgPool,
        actor: &Actor,
        chat_name: &str,
        params: &UpdateChatRoomParams,
    ) -> Result<ChatRoomView, AppError> {
        let room = Self::get_by_name(pool, chat_name).await?;
        Self::require_admin(&room, actor, "edit")?;
        Self::reject_course_room(&room)?;

        let new_name = match &params.chat_name {
            Some(name) => Self::validate_room_name(name)?,
            None => room.chat_name.clone(),
        };

        let mut tx = pool.begin().await?;
        sqlx::query("UPDATE chat_rooms SET chat_name = $1 WHERE id = $2")
            .bind(&new_name)
            .bind(room.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::from_constraint(e, format!("Chat room '{}' already exists", new_name))
            })?;

        if let Some(members) = &params.members {
            sqlx::query("DELETE FROM chat_room_members WHERE room_id = $1 AND user_id <> $2")
                .bind(room.id)
                .bind(room.admin_id)
                .execute(&mut *tx)
                .await?;
            let mut members = members.clone();
            members.push(room.admin_id);
            Self::insert_members(&mut tx, room.id, &members).await?;
        }
        tx.commit().await?;

        tracing::info!(room_id = %room.id, chat_name = %new_name, "Chat room updated");
        Self::view(pool, &new_name).await
    }

    /// Delete a room and its messages. Admin only.
    pub async fn delete(pool: &PgPool, actor: &Actor, chat_name: &str) -> Result<(), AppError> {
        let room = Self::get_by_name(pool, chat_name).await?;
        Self::require_admin(&room, actor, "delete")?;
        Self::reject_course_room(&room)?;

        sqlx::query("DELETE FROM chat_rooms WHERE id = $1")
            .bind(room.id)
            .execute(pool)
            .await?;

        tracing::info!(room_id = %room.id, chat_name = %room.chat_name, "Chat room deleted");
        Ok(())
    }

    pub async fn add_member(
        pool: &PgPool,
        actor: &Actor,
        chat_name: &str,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let room = Self::get_by_name(pool, chat_name).await?;
        Self::require_admin(&room, actor, "manage members of")?;
        Self::reject_course_room(&room)?;

        sqlx::query(
            "INSERT INTO chat_room_members (room_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(room.id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_constraint(e, "Already a member"))?;

        tracing::info!(room_id = %room.id, user_id = %user_id, "Chat room member added");
        Ok(())
    }

    pub async fn remove_member(
        pool: &PgPool,
        actor: &Actor,
        chat_name: &str,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let room = Self::get_by_name(pool, chat_name).await?;
        Self::require_admin(&room, actor, "manage members of")?;
        Self::reject_course_room(&room)?;
        if user_id == room.admin_id {
            return Err(AppError::Validation(
                "The room admin cannot be removed".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM chat_room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room.id)
            .bind(user_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "User {} is not a member of '{}'",
                user_id, chat_name
            )));
        }

        tracing::info!(room_id = %room.id, user_id = %user_id, "Chat room member removed");
        Ok(())
    }

    /// Grant a teacher moderation rights in a room. Admin only.
    pub async fn add_moderator(
        pool: &PgPool,
        actor: &Actor,
        chat_name: &str,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let room = Self::get_by_name(pool, chat_name).await?;
        Self::require_admin(&room, actor, "manage moderators of")?;

        let target = Actor::load(pool, user_id)
            .await
            .map_err(|_| AppError::NotFound(format!("User {} not found", user_id)))?;
        if !target.is_teacher() {
            return Err(AppError::Validation(
                "Only teachers can moderate chat rooms".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO chat_room_moderators (room_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(room.id)
        .bind(user_id)
        .execute(pool)
        .await?;

        tracing::info!(room_id = %room.id, user_id = %user_id, "Chat room moderator added");
        Ok(())
    }

    pub async fn is_member(pool: &PgPool, room_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM chat_room_members WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    }

    /// Resolve a room the caller is allowed to read and write.
    pub async fn room_for_member(
        pool: &PgPool,
        actor: &Actor,
        chat_name: &str,
    ) -> Result<ChatRoom, AppError> {
        let room = Self::get_by_name(pool, chat_name).await?;
        if !Self::is_member(pool, room.id, actor.user_id).await? {
            return Err(AppError::Forbidden(format!(
                "You are not a member of '{}'",
                chat_name
            )));
        }
        Ok(room)
    }

    // ------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------

    /// Persist a message from a room member.
    pub async fn post_message(
        pool: &PgPool,
        actor: &Actor,
        room: &ChatRoom,
        content: &str,
    ) -> Result<MessageView, AppError> {
        let content = Self::validate_message(content)?;
        if !Self::is_member(pool, room.id, actor.user_id).await? {
            return Err(AppError::Forbidden(format!(
                "You are not a member of '{}'",
                room.chat_name
            )));
        }

        let message: Message = sqlx::query_as(
            "INSERT INTO messages (chat_room_id, user_id, content) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(room.id)
        .bind(actor.user_id)
        .bind(&content)
        .fetch_one(pool)
        .await?;

        tracing::debug!(message_id = %message.id, room_id = %room.id, user_id = %actor.user_id, "Chat message stored");

        Ok(MessageView {
            id: message.id,
            chat_room_id: message.chat_room_id,
            user_id: message.user_id,
            username: actor.username.clone(),
            content: message.content,
            timestamp: message.timestamp,
        })
    }

    /// Persisted history for a room, oldest first. `limit` keeps the most recent messages.
    pub async fn history(
        pool: &PgPool,
        room: &ChatRoom,
        limit: Option<i64>,
    ) -> Result<Vec<MessageView>, AppError> {
        let limit = limit.unwrap_or(200).clamp(1, 1000);
        let messages = sqlx::query_as(&format!(
            r#"
            SELECT * FROM (
                {} WHERE m.chat_room_id = $1 ORDER BY m.timestamp DESC LIMIT $2
            ) recent
            ORDER BY timestamp
            "#,
            MESSAGE_SELECT
        ))
        .bind(room.id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(messages)
    }

    /// Delete a message. Allowed for its author, the room admin, and room moderators.
    pub async fn delete_message(
        pool: &PgPool,
        actor: &Actor,
        message_id: Uuid,
    ) -> Result<Message, AppError> {
        let message: Message = sqlx::query_as("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;

        let room: ChatRoom = sqlx::query_as("SELECT * FROM chat_rooms WHERE id = $1")
            .bind(message.chat_room_id)
            .fetch_one(pool)
            .await?;

        let is_moderator: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM chat_room_moderators WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room.id)
        .bind(actor.user_id)
        .fetch_optional(pool)
        .await?;

        let allowed = message.user_id == actor.user_id
            || room.admin_id == actor.user_id
            || is_moderator.is_some();
        if !allowed {
            return Err(AppError::Forbidden(
                "You are not authorized to delete this message".to_string(),
            ));
        }

        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(pool)
            .await?;

        tracing::info!(message_id = %message_id, room_id = %room.id, deleted_by = %actor.user_id, "Chat message deleted");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_message_trims() {
        assert_eq!(ChatRoomService::validate_message("  hi  ").unwrap(), "hi");
        assert!(ChatRoomService::validate_message("   ").is_err());
    }

    #[test]
    fn test_validate_message_length() {
        let long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(ChatRoomService::validate_message(&long).is_err());
        let max = "a".repeat(MAX_MESSAGE_CHARS);
        assert!(ChatRoomService::validate_message(&max).is_ok());
    }

    #[test]
    fn test_validate_room_name() {
        assert_eq!(
            ChatRoomService::validate_room_name(" study group ").unwrap(),
            "study group"
        );
        assert!(ChatRoomService::validate_room_name("").is_err());
    }

    #[test]
    fn test_discussion_room_names_are_reserved() {
        let result = ChatRoomService::validate_room_name(" Course CM101 Discussion ");
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(ChatRoomService::validate_room_name("CM101 Discussion").is_ok());
    }

    #[test]
    fn test_message_view_to_event() {
        let view = MessageView {
            id: Uuid::new_v4(),
            chat_room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            content: "hello".to_string(),
            timestamp: Utc::now(),
        };
        let event = view.to_event("lobby");
        assert_eq!(event.room, "lobby");
        assert_eq!(event.username, "alice");
        assert_eq!(event.message, "hello");
        assert_eq!(event.message_id, view.id);
    }

    #[test]
    fn test_course_room_edits_rejected() {
        let room = ChatRoom {
            id: Uuid::new_v4(),
            chat_name: "Course CM101 Discussion".to_string(),
            admin_id: Uuid::new_v4(),
            course_id: Some(Uuid::new_v4()),
            created_at: Utc::now(),
        };
        assert!(ChatRoomService::reject_course_room(&room).is_err());
    }
}
