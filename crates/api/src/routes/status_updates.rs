//! Status update routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::StatusUpdate;
use elearn_engine::status::{StatusParams, StatusService};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/{id}/status-updates", get(user_status_updates))
        .route("/api/status-updates", post(post_status_update))
        .route(
            "/api/status-updates/{id}",
            patch(edit_status_update).delete(delete_status_update),
        )
}

/// GET /api/users/:id/status-updates: Newest first.
async fn user_status_updates(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusUpdate>>, AppError> {
    Ok(Json(StatusService::list_for_user(&state.pool, id).await?))
}

/// POST /api/status-updates
async fn post_status_update(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<StatusParams>,
) -> Result<(StatusCode, Json<StatusUpdate>), AppError> {
    let update = StatusService::post(&state.pool, &auth.actor, &params.content).await?;
    Ok((StatusCode::CREATED, Json(update)))
}

/// PATCH /api/status-updates/:id
async fn edit_status_update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<StatusParams>,
) -> Result<Json<StatusUpdate>, AppError> {
    Ok(Json(
        StatusService::edit(&state.pool, &auth.actor, id, &params.content).await?,
    ))
}

/// DELETE /api/status-updates/:id
async fn delete_status_update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    StatusService::delete(&state.pool, &auth.actor, id).await?;
    Ok(Json(serde_json::json!({"deleted": true})))
}
