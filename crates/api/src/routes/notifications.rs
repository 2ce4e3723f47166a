//! Notification inbox routes.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_engine::notifications::{Inbox, NotificationService};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(inbox))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{kind}/{id}/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread: bool,
}

/// GET /api/notifications?unread=true
async fn inbox(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Inbox>, AppError> {
    Ok(Json(
        NotificationService::inbox(&state.pool, &auth.actor, query.unread).await?,
    ))
}

/// POST /api/notifications/:kind/:id/read: kind is enrollment, material or block.
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>, AppError> {
    NotificationService::mark_read(&state.pool, &auth.actor, &kind, id).await?;
    Ok(Json(serde_json::json!({"read": true})))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = NotificationService::mark_all_read(&state.pool, &auth.actor).await?;
    Ok(Json(serde_json::json!({"updated": updated})))
}
