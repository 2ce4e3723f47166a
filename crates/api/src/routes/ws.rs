//! WebSocket chat endpoint.
//!
//! One session per socket: it joins the room's group, stores every inbound
//! message and fans stored messages out to the group. Membership is checked
//! before the upgrade and again whenever the group reports a membership
//! change; sessions that lost membership are closed.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{ChatEvent, ChatRoom, RoomEvent};
use elearn_engine::access::Actor;
use elearn_engine::chat::ChatRoomService;
use elearn_realtime::group_name;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/chat/{room_name}", get(chat_socket))
}

/// Client → server frame.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub message: String,
}

/// Server → client frame.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OutboundFrame {
    pub message: String,
    pub username: String,
    pub user_id: Uuid,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatEvent> for OutboundFrame {
    fn from(event: ChatEvent) -> Self {
        Self {
            message: event.message,
            username: event.username,
            user_id: event.user_id,
            message_id: event.message_id,
            timestamp: event.timestamp,
        }
    }
}

/// GET /ws/chat/:room_name: Upgrade for room members; 403 for everyone else.
async fn chat_socket(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_name): Path<String>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let room = ChatRoomService::room_for_member(&state.pool, &auth.actor, &room_name).await?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let actor = auth.actor;
    Ok(upgrade.on_upgrade(move |socket| run_session(socket, state, actor, room)))
}

async fn run_session(socket: WebSocket, state: AppState, actor: Actor, mut room: ChatRoom) {
    let mut group = group_name(&room.chat_name);
    let mut events = state.channels.join(&group).await;
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(room = %room.chat_name, user_id = %actor.user_id, "Chat session opened");

    loop {
        let event = tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, &actor, &room, &group, text.as_str()).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, room = %room.chat_name, "Chat socket error");
                        break;
                    }
                }
            }
            event = events.recv() => event,
        };

        let event = match event {
            Ok(event) => event,
            // Skipped events may have included a membership change.
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(room = %room.chat_name, user_id = %actor.user_id, skipped, "Chat session lagging");
                RoomEvent::MembershipChanged
            }
            Err(RecvError::Closed) => break,
        };

        let step = match next_step(&state.pool, &actor, room.id, event).await {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(error = %e, room = %room.chat_name, "Chat membership check failed");
                SessionStep::Close
            }
        };

        match step {
            SessionStep::Forward(frame) => {
                let frame = match serde_json::to_string(&frame) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode chat frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            SessionStep::Stay => {}
            SessionStep::Rejoin(chat_name) => {
                drop(events);
                state.channels.leave(&group).await;
                group = group_name(&chat_name);
                events = state.channels.join(&group).await;
                tracing::debug!(from = %room.chat_name, to = %chat_name, "Chat session followed rename");
                room.chat_name = chat_name;
            }
            SessionStep::Close => {
                tracing::info!(room = %room.chat_name, user_id = %actor.user_id, "Chat membership revoked");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    drop(events);
    state.channels.leave(&group).await;
    tracing::info!(room = %room.chat_name, user_id = %actor.user_id, "Chat session closed");
}

/// What a live session does with one group event.
#[derive(Debug, PartialEq)]
pub enum SessionStep {
    /// Send the frame to the client.
    Forward(OutboundFrame),
    /// Still a member; nothing to send.
    Stay,
    /// The room was renamed; follow it to its new group.
    Rejoin(String),
    /// No longer a member.
    Close,
}

/// Resolve a group event for the session of `actor` in room `room_id`.
pub async fn next_step(
    pool: &PgPool,
    actor: &Actor,
    room_id: Uuid,
    event: RoomEvent,
) -> Result<SessionStep, AppError> {
    match event {
        RoomEvent::Message(event) => Ok(SessionStep::Forward(event.into())),
        RoomEvent::MembershipChanged => {
            if ChatRoomService::is_member(pool, room_id, actor.user_id).await? {
                Ok(SessionStep::Stay)
            } else {
                Ok(SessionStep::Close)
            }
        }
        RoomEvent::Renamed { chat_name } => Ok(SessionStep::Rejoin(chat_name)),
    }
}

/// Store one inbound message and send it to the group. Bad frames are dropped.
async fn handle_inbound(state: &AppState, actor: &Actor, room: &ChatRoom, group: &str, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, room = %room.chat_name, "Ignoring malformed chat frame");
            return;
        }
    };

    let message = match ChatRoomService::post_message(&state.pool, actor, room, &frame.message).await {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, room = %room.chat_name, user_id = %actor.user_id, "Chat message rejected");
            return;
        }
    };

    state
        .channels
        .group_send(group, message.to_event(&room.chat_name))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_frame_requires_message() {
        let frame: InboundFrame = serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
        assert_eq!(frame.message, "hello");
        assert!(serde_json::from_str::<InboundFrame>(r#"{"text": "hello"}"#).is_err());
        assert!(serde_json::from_str::<InboundFrame>("hello").is_err());
    }

    #[test]
    fn test_outbound_frame_shape() {
        let event = ChatEvent {
            message_id: Uuid::new_v4(),
            room: "study-group".to_string(),
            user_id: Uuid::new_v4(),
            username: "ada".to_string(),
            message: "hi all".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(OutboundFrame::from(event.clone())).unwrap();

        assert_eq!(json["message"], "hi all");
        assert_eq!(json["username"], "ada");
        assert_eq!(json["user_id"], event.user_id.to_string());
        assert_eq!(json["message_id"], event.message_id.to_string());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("room").is_none());
    }
}
