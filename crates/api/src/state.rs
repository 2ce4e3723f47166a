//! Shared application state for the Axum API server.

use sqlx::PgPool;
use uuid::Uuid;

use elearn_common::config::AppConfig;
use elearn_engine::chat::ChatRoomService;
use elearn_realtime::{ChannelLayer, group_name};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    /// Live chat groups; see [`ChannelLayer::group_send`].
    pub channels: ChannelLayer,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, channels: ChannelLayer) -> Self {
        Self {
            pool,
            config,
            channels,
        }
    }

    /// Name of a course's discussion room. Lookup failures are logged and
    /// treated as "no room" so they never fail a request that already committed.
    pub async fn course_room_name(&self, course_id: Uuid) -> Option<String> {
        match ChatRoomService::course_room(&self.pool, course_id).await {
            Ok(room) => room.map(|room| room.chat_name),
            Err(e) => {
                tracing::error!(error = %e, course_id = %course_id, "Failed to look up course room");
                None
            }
        }
    }

    /// Make live sessions of `chat_name` re-check their membership.
    pub async fn room_membership_changed(&self, chat_name: &str) {
        let sessions = self
            .channels
            .membership_changed(&group_name(chat_name))
            .await;
        tracing::debug!(room = %chat_name, sessions, "Chat membership change announced");
    }

    /// Move live sessions of `old_name` to `new_name`. No-op when unchanged.
    pub async fn room_renamed(&self, old_name: &str, new_name: &str) {
        if old_name == new_name {
            return;
        }
        let sessions = self
            .channels
            .room_renamed(&group_name(old_name), new_name)
            .await;
        tracing::debug!(from = %old_name, to = %new_name, sessions, "Chat room rename announced");
    }
}
