//! Chat room routes.
//!
//! Messages posted here are stored and then sent to the room's live group,
//! so REST and WebSocket clients see the same stream.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_engine::chat::{
    ChatRoomListItem, ChatRoomService, ChatRoomView, CreateChatRoomParams, MessageView,
    UpdateChatRoomParams,
};
use elearn_realtime::group_name;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat-rooms", get(list_rooms).post(create_room))
        .route(
            "/api/chat-rooms/{name}",
            get(get_room).patch(update_room).delete(delete_room),
        )
        .route(
            "/api/chat-rooms/{name}/messages",
            get(room_history).post(post_message),
        )
        .route(
            "/api/chat-rooms/{name}/members/{user_id}",
            post(add_member).delete(remove_member),
        )
        .route(
            "/api/chat-rooms/{name}/moderators/{user_id}",
            post(add_moderator),
        )
        .route("/api/messages/{id}", delete(delete_message))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub message: String,
}

/// GET /api/chat-rooms
async fn list_rooms(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<ChatRoomListItem>>, AppError> {
    Ok(Json(ChatRoomService::list(&state.pool).await?))
}

/// POST /api/chat-rooms: The caller becomes admin and member.
async fn create_room(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<CreateChatRoomParams>,
) -> Result<(StatusCode, Json<ChatRoomView>), AppError> {
    let room = ChatRoomService::create(&state.pool, &auth.actor, &params).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/chat-rooms/:name: Room with its members.
async fn get_room(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<ChatRoomView>, AppError> {
    Ok(Json(ChatRoomService::view(&state.pool, &name).await?))
}

/// PATCH /api/chat-rooms/:name
async fn update_room(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
    Json(params): Json<UpdateChatRoomParams>,
) -> Result<Json<ChatRoomView>, AppError> {
    let view = ChatRoomService::update(&state.pool, &auth.actor, &name, &params).await?;
    // Membership first: sessions re-check by room id before following the rename.
    if params.members.is_some() {
        state.room_membership_changed(&name).await;
    }
    state.room_renamed(&name, &view.room.chat_name).await;
    Ok(Json(view))
}

/// DELETE /api/chat-rooms/:name
async fn delete_room(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    ChatRoomService::delete(&state.pool, &auth.actor, &name).await?;
    state.room_membership_changed(&name).await;
    Ok(Json(serde_json::json!({"deleted": true})))
}

/// GET /api/chat-rooms/:name/messages?limit=: Members only, oldest first.
async fn room_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    let room = ChatRoomService::room_for_member(&state.pool, &auth.actor, &name).await?;
    Ok(Json(
        ChatRoomService::history(&state.pool, &room, query.limit).await?,
    ))
}

/// POST /api/chat-rooms/:name/messages: Store, then broadcast to live sessions.
async fn post_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let room = ChatRoomService::get_by_name(&state.pool, &name).await?;
    let message = ChatRoomService::post_message(&state.pool, &auth.actor, &room, &req.message).await?;

    let delivered = state
        .channels
        .group_send(&group_name(&room.chat_name), message.to_event(&room.chat_name))
        .await;
    tracing::debug!(message_id = %message.id, delivered, "Chat message broadcast");

    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/chat-rooms/:name/members/:user_id
async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((name, user_id)): Path<(String, Uuid)>,
) -> Result<Json<ChatRoomView>, AppError> {
    ChatRoomService::add_member(&state.pool, &auth.actor, &name, user_id).await?;
    Ok(Json(ChatRoomService::view(&state.pool, &name).await?))
}

/// DELETE /api/chat-rooms/:name/members/:user_id: The admin cannot be removed.
async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((name, user_id)): Path<(String, Uuid)>,
) -> Result<Json<ChatRoomView>, AppError> {
    ChatRoomService::remove_member(&state.pool, &auth.actor, &name, user_id).await?;
    state.room_membership_changed(&name).await;
    Ok(Json(ChatRoomService::view(&state.pool, &name).await?))
}

/// POST /api/chat-rooms/:name/moderators/:user_id: Teachers only.
async fn add_moderator(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((name, user_id)): Path<(String, Uuid)>,
) -> Result<Json<ChatRoomView>, AppError> {
    ChatRoomService::add_moderator(&state.pool, &auth.actor, &name, user_id).await?;
    Ok(Json(ChatRoomService::view(&state.pool, &name).await?))
}

/// DELETE /api/messages/:id: Author, room admin or moderator.
async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    ChatRoomService::delete_message(&state.pool, &auth.actor, id).await?;
    Ok(Json(serde_json::json!({"deleted": true})))
}
