//! Course feedback routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::Feedback;
use elearn_engine::feedback::{
    FeedbackService, FeedbackView, SubmitFeedbackParams, UpdateFeedbackParams,
};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/courses/{id}/feedback",
            get(course_feedback).post(submit_feedback),
        )
        .route(
            "/api/feedback/{id}",
            patch(update_feedback).delete(delete_feedback),
        )
}

/// GET /api/courses/:id/feedback
async fn course_feedback(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FeedbackView>>, AppError> {
    Ok(Json(FeedbackService::list_for_course(&state.pool, id).await?))
}

/// POST /api/courses/:id/feedback: Enrolled students only.
async fn submit_feedback(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<SubmitFeedbackParams>,
) -> Result<(StatusCode, Json<Feedback>), AppError> {
    let feedback = FeedbackService::submit(&state.pool, &auth.actor, id, &params).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// PATCH /api/feedback/:id
async fn update_feedback(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<UpdateFeedbackParams>,
) -> Result<Json<Feedback>, AppError> {
    Ok(Json(
        FeedbackService::update(&state.pool, &auth.actor, id, &params).await?,
    ))
}

/// DELETE /api/feedback/:id
async fn delete_feedback(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    FeedbackService::delete(&state.pool, &auth.actor, id).await?;
    Ok(Json(serde_json::json!({"deleted": true})))
}
