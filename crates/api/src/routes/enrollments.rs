//! Enrollment and blocking routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::BlockNotification;
use elearn_engine::enrollment::{EnrollmentOutcome, EnrollmentService, EnrollmentView};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/enrollments", get(my_enrollments))
        .route("/api/courses/{id}/enroll", post(enroll).delete(unenroll))
        .route("/api/courses/{id}/enrollments", get(course_enrollments))
        .route(
            "/api/courses/{id}/students/{student_id}/block",
            post(block_student),
        )
        .route(
            "/api/courses/{id}/students/{student_id}/unblock",
            post(unblock_student),
        )
}

/// GET /api/enrollments: The calling student's enrollments.
async fn my_enrollments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<EnrollmentView>>, AppError> {
    Ok(Json(
        EnrollmentService::list_for_student(&state.pool, &auth.actor).await?,
    ))
}

/// POST /api/courses/:id/enroll: Enroll; notifies the course teacher.
async fn enroll(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EnrollmentOutcome>), AppError> {
    let outcome = EnrollmentService::enroll(&state.pool, &auth.actor, id).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// DELETE /api/courses/:id/enroll: Leave a course.
async fn unenroll(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    EnrollmentService::unenroll(&state.pool, &auth.actor, id).await?;
    if let Some(room) = state.course_room_name(id).await {
        state.room_membership_changed(&room).await;
    }
    Ok(Json(serde_json::json!({"unenrolled": true})))
}

/// GET /api/courses/:id/enrollments: Enrolled students (course teacher only).
async fn course_enrollments(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EnrollmentView>>, AppError> {
    Ok(Json(
        EnrollmentService::list_for_course(&state.pool, &auth.actor, id).await?,
    ))
}

/// POST /api/courses/:id/students/:student_id/block
async fn block_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, student_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BlockNotification>, AppError> {
    let notification = EnrollmentService::block(&state.pool, &auth.actor, id, student_id).await?;
    if let Some(room) = state.course_room_name(id).await {
        state.room_membership_changed(&room).await;
    }
    Ok(Json(notification))
}

/// POST /api/courses/:id/students/:student_id/unblock
async fn unblock_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, student_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, AppError> {
    EnrollmentService::unblock(&state.pool, &auth.actor, id, student_id).await?;
    Ok(Json(serde_json::json!({"unblocked": true})))
}
